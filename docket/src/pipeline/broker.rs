use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendError, Sender};
use parking_lot::Mutex;

use crate::collection::{Collection, FlushReport};
use crate::common::{
    async_task, DEFAULT_COLLECTION_CHANNEL_CAPACITY, DEFAULT_DISPATCHER_RESTART_DELAY_MS,
    DEFAULT_INTAKE_CAPACITY,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::pipeline::worker::{panic_message, spawn_worker};
use crate::pipeline::{Event, EventOutcome, IncomeRequest};
use crate::store::Storage;

/// Looks up the live collection an event is addressed to.
pub trait CollectionResolver: Send + Sync {
    fn resolve(&self, database: &str, collection: &str) -> DocketResult<Collection>;
}

/// Queue sizes and supervision timing of a [Broker].
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub intake_capacity: usize,
    pub channel_capacity: usize,
    pub restart_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            channel_capacity: DEFAULT_COLLECTION_CHANNEL_CAPACITY,
            restart_delay: Duration::from_millis(DEFAULT_DISPATCHER_RESTART_DELAY_MS),
        }
    }
}

/// Totals of a synchronous flush across collections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub collections: usize,
    pub batches_written: usize,
    pub batches_failed: usize,
    pub failed_collections: usize,
}

impl FlushSummary {
    fn add(&mut self, report: &FlushReport) {
        self.batches_written += report.batches_written;
        self.batches_failed += report.batches_failed;
    }
}

type ChannelKey = (String, String);

struct CollectionChannel {
    sender: Sender<IncomeRequest>,
    worker: JoinHandle<()>,
}

/// Routes requests from the global intake queue to per-collection workers.
///
/// A single dispatcher thread drains the bounded intake and forwards each
/// request to the bounded channel of its collection, creating the channel
/// and its worker on first use. Requests for one collection therefore reach
/// its worker in submission order. A full channel blocks the dispatcher,
/// which in turn blocks submitters once the intake fills up.
///
/// The dispatcher runs under a supervisor: a panic is logged and dispatching
/// resumes after the configured delay.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    config: BrokerConfig,
    intake: Mutex<Option<Sender<IncomeRequest>>>,
    intake_receiver: Receiver<IncomeRequest>,
    channels: Mutex<HashMap<ChannelKey, CollectionChannel>>,
    retired: Mutex<Vec<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    resolver: Arc<dyn CollectionResolver>,
    storage: Storage,
}

impl Broker {
    pub fn new(resolver: Arc<dyn CollectionResolver>, storage: Storage, config: BrokerConfig) -> Self {
        let (sender, receiver) = channel::bounded(config.intake_capacity.max(1));
        Broker {
            inner: Arc::new(BrokerInner {
                config,
                intake: Mutex::new(Some(sender)),
                intake_receiver: receiver,
                channels: Mutex::new(HashMap::new()),
                retired: Mutex::new(Vec::new()),
                dispatcher: Mutex::new(None),
                resolver,
                storage,
            }),
        }
    }

    /// Spawns the supervised dispatcher.
    pub fn start(&self) -> DocketResult<()> {
        let mut dispatcher = self.inner.dispatcher.lock();
        if dispatcher.is_some() {
            return Err(DocketError::new("Broker is already started", ErrorKind::InvalidOperation));
        }
        self.ensure_open()?;

        let inner = Arc::clone(&self.inner);
        *dispatcher = Some(async_task("docket-dispatcher", move || inner.supervise())?);
        log::info!("Broker started");
        Ok(())
    }

    /// Enqueues a request on the intake queue, blocking while it is full.
    pub fn submit(&self, request: IncomeRequest) -> DocketResult<()> {
        let sender = self.inner.intake.lock().clone().ok_or_else(closed_error)?;
        sender.send(request)?;
        Ok(())
    }

    /// Enqueues an event and waits for the worker to apply it.
    pub fn submit_and_wait(&self, database: &str, collection: &str, event: Event) -> DocketResult<EventOutcome> {
        let (request, reply) = IncomeRequest::with_reply(database, collection, event);
        self.submit(request)?;
        reply.recv()?
    }

    /// Starts the worker of `collection` unless it already has one.
    pub fn register(&self, collection: &Collection) -> DocketResult<()> {
        self.ensure_open()?;
        let mut channels = self.inner.channels.lock();
        let key = (collection.database().to_string(), collection.name().to_string());
        if !channels.contains_key(&key) {
            let channel = self.inner.open_channel(collection.clone())?;
            channels.insert(key, channel);
        }
        Ok(())
    }

    /// Enqueues a flush event for every collection with a worker.
    pub fn broadcast_flush(&self) -> DocketResult<usize> {
        let keys = self.inner.channel_keys();
        for (database, collection) in &keys {
            self.submit(IncomeRequest::new(database, collection, Event::FlushToDisk))?;
        }
        log::debug!("Broadcast flush to {} collections", keys.len());
        Ok(keys.len())
    }

    /// Flushes every collection with a worker and waits for all of them.
    pub fn flush_all_and_wait(&self) -> DocketResult<FlushSummary> {
        let mut pending = Vec::new();
        for (database, collection) in self.inner.channel_keys() {
            let (request, reply) = IncomeRequest::with_reply(&database, &collection, Event::FlushToDisk);
            self.submit(request)?;
            pending.push((database, collection, reply));
        }

        let mut summary = FlushSummary::default();
        for (database, collection, reply) in pending {
            summary.collections += 1;
            match reply.recv() {
                Ok(Ok(EventOutcome::Flushed(report))) => summary.add(&report),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    log::warn!("Flush of {}/{} failed: {}", database, collection, err);
                    summary.failed_collections += 1;
                }
                Err(err) => {
                    log::warn!("Flush of {}/{} got no reply: {}", database, collection, err);
                    summary.failed_collections += 1;
                }
            }
        }
        Ok(summary)
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }

    pub fn is_running(&self) -> bool {
        let open = self.inner.intake.lock().is_some();
        open && self.inner.dispatcher.lock().is_some()
    }

    /// Closes the intake, lets the dispatcher drain it, then closes every
    /// collection channel and joins the workers.
    pub fn shutdown(&self) {
        let intake = self.inner.intake.lock().take();
        if intake.is_none() {
            return;
        }
        drop(intake);

        let dispatcher = self.inner.dispatcher.lock().take();
        match dispatcher {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("Dispatcher thread terminated abnormally");
                }
            }
            None => self.inner.close_channels(),
        }
        log::info!("Broker stopped");
    }

    fn ensure_open(&self) -> DocketResult<()> {
        if self.inner.intake.lock().is_none() {
            return Err(closed_error());
        }
        Ok(())
    }
}

impl BrokerInner {
    fn supervise(self: Arc<Self>) {
        loop {
            match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch())) {
                Ok(()) => break,
                Err(payload) => {
                    log::error!(
                        "Dispatcher panicked: {}, restarting in {:?}",
                        panic_message(payload.as_ref()),
                        self.config.restart_delay
                    );
                    std::thread::sleep(self.config.restart_delay);
                }
            }
        }
        self.close_channels();
    }

    fn dispatch(&self) {
        while let Ok(request) = self.intake_receiver.recv() {
            self.route(request);
        }
        log::debug!("Intake closed, dispatcher exiting");
    }

    fn route(&self, request: IncomeRequest) {
        let key = (request.database.clone(), request.collection.clone());

        // a stopped worker never sees another event, so its channel is
        // retired before the stop is forwarded
        if matches!(request.event, Event::StopWorker) {
            let channel = self.channels.lock().remove(&key);
            match channel {
                Some(channel) => {
                    forward(&channel.sender, request);
                    self.retired.lock().push(channel.worker);
                }
                None => {
                    log::warn!("No running worker for {}/{}, dropping stop event", key.0, key.1);
                    request.respond(Err(DocketError::new(
                        &format!("Collection {}/{} has no running worker", key.0, key.1),
                        ErrorKind::ChannelClosed,
                    )));
                }
            }
            return;
        }

        match self.channel_for(&key) {
            Ok(sender) => forward(&sender, request),
            Err(err) => {
                log::warn!(
                    "Dropping {} event for {}/{}: {}",
                    request.event.name(),
                    request.database,
                    request.collection,
                    err
                );
                request.respond(Err(err));
            }
        }
    }

    fn channel_for(&self, key: &ChannelKey) -> DocketResult<Sender<IncomeRequest>> {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(key) {
            return Ok(channel.sender.clone());
        }

        let collection = self.resolver.resolve(&key.0, &key.1)?;
        if collection.is_stopped() {
            return Err(DocketError::new(
                &format!("Worker of {}/{} has been stopped", key.0, key.1),
                ErrorKind::InvalidOperation,
            ));
        }
        let channel = self.open_channel(collection)?;
        let sender = channel.sender.clone();
        channels.insert(key.clone(), channel);
        Ok(sender)
    }

    fn open_channel(&self, collection: Collection) -> DocketResult<CollectionChannel> {
        let (sender, receiver) = channel::bounded(self.config.channel_capacity.max(1));
        log::debug!("Starting worker for {}/{}", collection.database(), collection.name());
        let worker = spawn_worker(collection, self.storage.clone(), receiver)?;
        Ok(CollectionChannel { sender, worker })
    }

    fn channel_keys(&self) -> Vec<ChannelKey> {
        self.channels.lock().keys().cloned().collect()
    }

    fn close_channels(&self) {
        let channels: Vec<CollectionChannel> = self.channels.lock().drain().map(|(_, c)| c).collect();
        let mut workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.retired.lock());
        for channel in channels {
            drop(channel.sender);
            workers.push(channel.worker);
        }
        for worker in workers {
            if worker.join().is_err() {
                log::error!("Collection worker terminated abnormally");
            }
        }
        log::debug!("All collection channels closed");
    }
}

fn forward(sender: &Sender<IncomeRequest>, request: IncomeRequest) {
    if let Err(SendError(request)) = sender.send(request) {
        log::warn!(
            "Worker for {}/{} is gone, dropping {} event",
            request.database,
            request.collection,
            request.event.name()
        );
        request.respond(Err(DocketError::new(
            "Collection worker is no longer running",
            ErrorKind::ChannelClosed,
        )));
    }
}

fn closed_error() -> DocketError {
    DocketError::new("Broker is shut down", ErrorKind::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::filter::FilterExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestResolver {
        collections: Mutex<HashMap<ChannelKey, Collection>>,
        resolved: AtomicUsize,
    }

    impl TestResolver {
        fn new(names: &[&str]) -> Arc<Self> {
            let collections = names
                .iter()
                .map(|name| {
                    let collection = Collection::new("db", name, &[], 100, FilterExecutor::default());
                    (("db".to_string(), name.to_string()), collection)
                })
                .collect();
            Arc::new(TestResolver {
                collections: Mutex::new(collections),
                resolved: AtomicUsize::new(0),
            })
        }

        fn get(&self, name: &str) -> Collection {
            self.collections.lock()[&("db".to_string(), name.to_string())].clone()
        }
    }

    impl CollectionResolver for TestResolver {
        fn resolve(&self, database: &str, collection: &str) -> DocketResult<Collection> {
            if collection == "explode" {
                panic!("resolver exploded");
            }
            self.resolved.fetch_add(1, Ordering::Relaxed);
            self.collections
                .lock()
                .get(&(database.to_string(), collection.to_string()))
                .cloned()
                .ok_or_else(|| DocketError::new("no such collection", ErrorKind::CollectionNotFound))
        }
    }

    fn broker(resolver: Arc<TestResolver>) -> Broker {
        let config = BrokerConfig {
            intake_capacity: 64,
            channel_capacity: 16,
            restart_delay: Duration::from_millis(10),
        };
        let broker = Broker::new(resolver, Storage::in_memory(), config);
        broker.start().unwrap();
        broker
    }

    #[test]
    fn channels_are_created_lazily_once() {
        let resolver = TestResolver::new(&["users"]);
        let broker = broker(resolver.clone());
        assert_eq!(broker.channel_count(), 0);

        for i in 0..10 {
            broker
                .submit(IncomeRequest::new("db", "users", Event::Create(doc! { "n": i })))
                .unwrap();
        }
        broker.submit_and_wait("db", "users", Event::FlushToDisk).unwrap();

        assert_eq!(broker.channel_count(), 1);
        assert_eq!(resolver.resolved.load(Ordering::Relaxed), 1);
        assert_eq!(resolver.get("users").len(), 10);
        broker.shutdown();
    }

    #[test]
    fn unknown_collection_is_reported_to_waiting_submitter() {
        let broker = broker(TestResolver::new(&[]));
        let err = broker
            .submit_and_wait("db", "missing", Event::Create(doc! {}))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CollectionNotFound);
        assert_eq!(broker.channel_count(), 0);
        broker.shutdown();
    }

    #[test]
    fn dispatcher_restarts_after_panic() {
        let resolver = TestResolver::new(&["users"]);
        let broker = broker(resolver.clone());

        let err = broker
            .submit_and_wait("db", "explode", Event::Create(doc! {}))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ChannelClosed);

        let outcome = broker
            .submit_and_wait("db", "users", Event::Create(doc! { "a": 1 }))
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Created(_)));
        broker.shutdown();
    }

    #[test]
    fn stop_worker_retires_channel() {
        let resolver = TestResolver::new(&["users"]);
        let broker = broker(resolver.clone());
        broker.register(&resolver.get("users")).unwrap();
        assert_eq!(broker.channel_count(), 1);

        let outcome = broker.submit_and_wait("db", "users", Event::StopWorker).unwrap();
        assert_eq!(outcome, EventOutcome::Stopped);
        assert_eq!(broker.channel_count(), 0);

        // a stopped collection does not get a new worker
        let err = broker
            .submit_and_wait("db", "users", Event::Create(doc! {}))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        broker.shutdown();
    }

    #[test]
    fn stop_without_worker_is_rejected() {
        let resolver = TestResolver::new(&["users"]);
        let broker = broker(resolver.clone());
        let err = broker.submit_and_wait("db", "users", Event::StopWorker).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ChannelClosed);
        assert!(!resolver.get("users").is_stopped());
        broker.shutdown();
    }

    #[test]
    fn flush_all_and_wait_covers_every_channel() {
        let resolver = TestResolver::new(&["a", "b"]);
        let broker = broker(resolver.clone());
        broker.submit(IncomeRequest::new("db", "a", Event::Create(doc! { "x": 1 }))).unwrap();
        broker.submit(IncomeRequest::new("db", "b", Event::Create(doc! { "x": 2 }))).unwrap();
        broker.register(&resolver.get("a")).unwrap();
        broker.register(&resolver.get("b")).unwrap();

        let summary = broker.flush_all_and_wait().unwrap();
        assert_eq!(summary.collections, 2);
        assert_eq!(summary.batches_written, 2);
        assert_eq!(summary.failed_collections, 0);
        broker.shutdown();
    }

    #[test]
    fn shutdown_drains_intake_and_rejects_new_requests() {
        let resolver = TestResolver::new(&["users"]);
        let broker = broker(resolver.clone());
        for i in 0..50 {
            broker
                .submit(IncomeRequest::new("db", "users", Event::Create(doc! { "n": i })))
                .unwrap();
        }
        broker.shutdown();
        assert_eq!(resolver.get("users").len(), 50);
        assert!(!broker.is_running());

        let err = broker
            .submit(IncomeRequest::new("db", "users", Event::FlushToDisk))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ChannelClosed);
        broker.shutdown();
    }
}
