use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::common::Scheduler;

/// Periodic flush ticker.
///
/// Every tick runs the supplied callback, which enqueues a flush event for
/// every live collection. A zero interval disables the ticker.
pub(crate) struct FlushScheduler {
    interval: Duration,
    scheduler: Scheduler,
    running: AtomicBool,
}

impl FlushScheduler {
    pub(crate) fn new(interval: Duration) -> Self {
        FlushScheduler {
            interval,
            scheduler: Scheduler::new(),
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn start<F>(&self, tick: F)
    where
        F: 'static + FnMut() + Send,
    {
        if self.interval.is_zero() {
            log::info!("Periodic flush is disabled");
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            log::warn!("Flush scheduler already running");
            return;
        }

        self.scheduler.schedule(self.interval, tick);
        log::info!("Flushing dirty batches every {:?}", self.interval);
    }

    pub(crate) fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.scheduler.stop();
            log::debug!("Flush scheduler stopped");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.scheduler.task_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use test_retry::retry;

    #[test]
    #[retry]
    fn ticks_until_stopped() {
        let scheduler = FlushScheduler::new(Duration::from_millis(20));
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        scheduler.start(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert!(scheduler.is_running());

        awaitility::at_most(Duration::from_millis(500)).until(|| ticks.load(Ordering::Relaxed) >= 2);
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn zero_interval_disables() {
        let scheduler = FlushScheduler::new(Duration::ZERO);
        scheduler.start(|| {});
        assert!(!scheduler.is_running());
    }

    #[test]
    fn second_start_is_ignored() {
        let scheduler = FlushScheduler::new(Duration::from_secs(60));
        scheduler.start(|| {});
        scheduler.start(|| {});
        assert_eq!(scheduler.scheduler.task_count(), 1);
        scheduler.stop();
    }
}
