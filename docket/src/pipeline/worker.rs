use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam::channel::Receiver;

use crate::collection::Collection;
use crate::common::async_task;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::pipeline::{Event, EventOutcome, IncomeRequest};
use crate::store::Storage;

/// Starts the single writer thread of `collection`.
///
/// The worker applies events in channel order until it handles
/// [Event::StopWorker] or its channel is closed. A panic while applying an
/// event is contained to that event.
pub(crate) fn spawn_worker(
    collection: Collection,
    storage: Storage,
    receiver: Receiver<IncomeRequest>,
) -> DocketResult<JoinHandle<()>> {
    let name = format!("docket-worker-{}-{}", collection.database(), collection.name());
    async_task(&name, move || run(collection, storage, receiver))
}

fn run(collection: Collection, storage: Storage, receiver: Receiver<IncomeRequest>) {
    log::debug!("Worker for {}/{} started", collection.database(), collection.name());

    while let Ok(request) = receiver.recv() {
        let IncomeRequest { event, reply, .. } = request;
        let event_name = event.name();
        let stop = matches!(event, Event::StopWorker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| apply(&collection, &storage, event)))
            .unwrap_or_else(|payload| {
                Err(DocketError::new(
                    &format!(
                        "Worker for {}/{} panicked on {} event: {}",
                        collection.database(),
                        collection.name(),
                        event_name,
                        panic_message(payload.as_ref())
                    ),
                    ErrorKind::WorkerPanic,
                ))
            });

        if let Err(err) = &outcome {
            match err.kind() {
                ErrorKind::WorkerPanic => log::error!("{}", err),
                _ => log::warn!(
                    "Dropped {} event for {}/{}: {}",
                    event_name,
                    collection.database(),
                    collection.name(),
                    err
                ),
            }
        }
        if let Some(reply) = reply {
            // the submitter may have stopped waiting
            let _ = reply.send(outcome);
        }

        if stop {
            break;
        }
    }

    log::debug!("Worker for {}/{} exited", collection.database(), collection.name());
}

fn apply(collection: &Collection, storage: &Storage, event: Event) -> DocketResult<EventOutcome> {
    match event {
        Event::Create(document) => Ok(EventOutcome::Created(collection.create(document))),
        Event::Update(id, changes) => collection.update(&id, &changes).map(EventOutcome::Updated),
        Event::Delete(id) => collection.delete(&id).map(EventOutcome::Deleted),
        Event::FlushToDisk => collection.flush(storage).map(EventOutcome::Flushed),
        Event::StopWorker => {
            collection.clear();
            collection.mark_stopped();
            if collection.is_deleted() {
                if let Err(err) = storage.purge_collection(collection.database(), collection.name()) {
                    log::error!(
                        "Failed to purge files of {}/{}: {}",
                        collection.database(),
                        collection.name(),
                        err
                    );
                }
            }
            Ok(EventOutcome::Stopped)
        }
    }
}

/// Best effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
