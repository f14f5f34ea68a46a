use crate::errors::{DocketError, DocketResult, ErrorKind};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use timer::{Guard, Timer};

/// Spawns a named background thread.
pub fn async_task<OP>(name: &str, op: OP) -> DocketResult<JoinHandle<()>>
where
    OP: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(op)
        .map_err(|err| {
            log::error!("Failed to spawn thread '{}': {}", name, err);
            DocketError::new(
                &format!("Failed to spawn thread '{}': {}", name, err),
                ErrorKind::InternalError,
            )
        })
}

/// Repeating timer tasks whose lifetime is tied to the scheduler.
///
/// Dropping the scheduler, or calling [Scheduler::stop], cancels every task.
pub struct Scheduler {
    timer: Timer,
    guards: Mutex<Vec<Guard>>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            timer: Timer::new(),
            guards: Mutex::from(Vec::with_capacity(4)),
        }
    }

    pub fn schedule<F>(&self, duration: Duration, f: F)
    where
        F: 'static + FnMut() + Send,
    {
        match chrono::Duration::from_std(duration) {
            Ok(chrono_duration) => {
                let guard = self.timer.schedule_repeating(chrono_duration, f);
                self.guards.lock().push(guard);
            }
            Err(e) => {
                log::error!("Failed to convert duration to chrono::Duration: {}, skipping task scheduling", e);
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.guards.lock().len()
    }

    pub fn stop(&self) {
        self.guards.lock().clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}
