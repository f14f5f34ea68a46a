use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::collection::{Collection, CollectionStats, Document};
use crate::docket_builder::DocketBuilder;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::FilterSpec;
use crate::pipeline::{Broker, Event, EventOutcome, FlushSummary, IncomeRequest};
use crate::registry::{Catalog, CollectionSpec};
use crate::store::{FlushScheduler, Storage};

/// An open Docket instance.
///
/// `Docket` is the entry point for every operation: administering databases
/// and collections, submitting mutation events, reading and filtering
/// documents, and flushing to storage.
///
/// Mutations never touch a collection directly. They are placed on a global
/// intake queue and applied, in submission order, by the single worker
/// thread of the target collection. Reads run on the calling thread against
/// the state of the last applied mutation.
///
/// Cloning is cheap, all clones share the same instance. The instance is
/// closed by [Docket::close] or when the last clone is dropped.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::{doc, Docket, Event, FilterSpec, CollectionSpec};
///
/// let docket = Docket::builder().storage_path("/var/lib/docket").open()?;
/// docket.create_database("hr")?;
/// docket.create_collections("hr", &[CollectionSpec::new("employees").with_index("city")])?;
///
/// docket.submit_event("hr", "employees", Event::Create(doc! { "name": "Asha", "city": "Chennai" }))?;
///
/// let in_chennai = docket.filter_documents("hr", "employees", &FilterSpec::new().eq("city", "Chennai"))?;
/// docket.close()?;
/// ```
#[derive(Clone)]
pub struct Docket {
    inner: Arc<DocketInner>,
}

impl Docket {
    pub fn builder() -> DocketBuilder {
        DocketBuilder::new()
    }

    pub(crate) fn open(config: DocketConfig) -> DocketResult<Self> {
        config.initialize();
        let storage = config.storage()?;

        let catalog = Catalog::new(storage.clone(), config.clone());
        catalog.load()?;

        let broker = Broker::new(Arc::new(catalog.clone()), storage.clone(), config.broker_config());
        broker.start()?;
        for collection in catalog.all_collections() {
            if let Err(err) = broker.register(&collection) {
                broker.shutdown();
                return Err(err);
            }
        }

        let scheduler = FlushScheduler::new(config.flush_interval());
        let ticker = broker.clone();
        scheduler.start(move || {
            if let Err(err) = ticker.broadcast_flush() {
                log::warn!("Periodic flush could not be scheduled: {}", err);
            }
        });

        log::info!(
            "Docket opened with {} databases",
            catalog.list_databases().len()
        );
        Ok(Docket {
            inner: Arc::new(DocketInner {
                config,
                storage,
                catalog,
                broker,
                scheduler,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> DocketConfig {
        self.inner.config.clone()
    }

    pub fn storage(&self) -> Storage {
        self.inner.storage.clone()
    }

    /// Enqueues an event for a collection.
    ///
    /// Only the enqueue is acknowledged. A mutation that later fails, such as
    /// an update of a missing id, is logged by the worker and dropped.
    pub fn submit_event(&self, database: &str, collection: &str, event: Event) -> DocketResult<()> {
        self.inner.check_opened()?;
        self.inner.catalog.collection(database, collection)?;
        self.inner
            .broker
            .submit(IncomeRequest::new(database, collection, event))
    }

    /// Enqueues an event and waits until the collection worker applied it.
    pub fn submit_and_wait(&self, database: &str, collection: &str, event: Event) -> DocketResult<EventOutcome> {
        self.inner.check_opened()?;
        self.inner.catalog.collection(database, collection)?;
        self.inner.broker.submit_and_wait(database, collection, event)
    }

    /// Creates a document and returns it with `id`, `index` and `created` set.
    pub fn insert_document(&self, database: &str, collection: &str, document: Document) -> DocketResult<Document> {
        match self.submit_and_wait(database, collection, Event::Create(document))? {
            EventOutcome::Created(document) => Ok(document),
            other => Err(unexpected_outcome("create", &other)),
        }
    }

    /// Shallow merges `changes` into a document and returns the result.
    pub fn update_document(
        &self,
        database: &str,
        collection: &str,
        id: &str,
        changes: Document,
    ) -> DocketResult<Document> {
        match self.submit_and_wait(database, collection, Event::Update(id.to_string(), changes))? {
            EventOutcome::Updated(document) => Ok(document),
            other => Err(unexpected_outcome("update", &other)),
        }
    }

    /// Removes a document and returns it.
    pub fn delete_document(&self, database: &str, collection: &str, id: &str) -> DocketResult<Document> {
        match self.submit_and_wait(database, collection, Event::Delete(id.to_string()))? {
            EventOutcome::Deleted(document) => Ok(document),
            other => Err(unexpected_outcome("delete", &other)),
        }
    }

    pub fn read_document(&self, database: &str, collection: &str, id: &str) -> DocketResult<Document> {
        self.collection(database, collection)?.read(id)
    }

    /// Documents matching every condition of `filter`, ascending by `index`.
    pub fn filter_documents(&self, database: &str, collection: &str, filter: &FilterSpec) -> DocketResult<Vec<Document>> {
        self.collection(database, collection)?.filter(filter)
    }

    /// Every document of a collection, ascending by `index`.
    pub fn get_all_documents(&self, database: &str, collection: &str) -> DocketResult<Vec<Document>> {
        Ok(self.collection(database, collection)?.all_documents())
    }

    pub fn collection_stats(&self, database: &str, collection: &str) -> DocketResult<CollectionStats> {
        Ok(self.collection(database, collection)?.stats())
    }

    pub fn create_database(&self, name: &str) -> DocketResult<()> {
        self.inner.check_opened()?;
        self.inner.catalog.create_database(name)?;
        Ok(())
    }

    /// Deletes a database with all its collections and their stored files.
    pub fn delete_database(&self, name: &str) -> DocketResult<()> {
        self.inner.check_opened()?;
        let collections = self.inner.catalog.delete_database(name)?;
        self.inner.stop_workers(&collections);
        Ok(())
    }

    pub fn list_databases(&self) -> DocketResult<Vec<String>> {
        self.inner.check_opened()?;
        Ok(self.inner.catalog.list_databases())
    }

    /// Creates every collection in `specs` and starts their workers. Fails
    /// without creating anything if any name is taken.
    pub fn create_collections(&self, database: &str, specs: &[CollectionSpec]) -> DocketResult<()> {
        self.inner.check_opened()?;
        let collections = self.inner.catalog.create_collections(database, specs)?;
        for collection in &collections {
            self.inner.broker.register(collection)?;
        }
        Ok(())
    }

    /// Deletes the named collections and their stored files. Fails without
    /// deleting anything if any name is unknown.
    pub fn delete_collections(&self, database: &str, names: &[&str]) -> DocketResult<()> {
        self.inner.check_opened()?;
        let collections = self.inner.catalog.delete_collections(database, names)?;
        self.inner.stop_workers(&collections);
        Ok(())
    }

    pub fn list_collections(&self, database: &str) -> DocketResult<Vec<String>> {
        self.inner.check_opened()?;
        self.inner.catalog.list_collections(database)
    }

    /// Enqueues a flush for every collection and returns how many were
    /// notified. Flush events are ordered after every event submitted before.
    pub fn flush_all_to_disk(&self) -> DocketResult<usize> {
        self.inner.check_opened()?;
        if let Err(err) = self.inner.catalog.write_all_metadata() {
            log::warn!("Database metadata not fully written: {}", err);
        }
        self.inner.broker.broadcast_flush()
    }

    /// Flushes every collection and waits for all of them.
    pub fn flush_all_and_wait(&self) -> DocketResult<FlushSummary> {
        self.inner.check_opened()?;
        self.inner.flush_all_and_wait()
    }

    /// Stops the flush ticker, flushes everything and stops all workers.
    ///
    /// Closing twice is a no-op. A flush failure is returned after the
    /// instance has been shut down anyway.
    pub fn close(&self) -> DocketResult<()> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn collection(&self, database: &str, collection: &str) -> DocketResult<Collection> {
        self.inner.check_opened()?;
        self.inner.catalog.collection(database, collection)
    }
}

impl std::fmt::Debug for Docket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docket")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct DocketInner {
    config: DocketConfig,
    storage: Storage,
    catalog: Catalog,
    broker: Broker,
    scheduler: FlushScheduler,
    closed: AtomicBool,
}

impl DocketInner {
    fn check_opened(&self) -> DocketResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Docket is closed");
            return Err(DocketError::new("Docket is closed", ErrorKind::InvalidOperation));
        }
        Ok(())
    }

    fn flush_all_and_wait(&self) -> DocketResult<FlushSummary> {
        let metadata = self.catalog.write_all_metadata();
        let summary = self.broker.flush_all_and_wait()?;
        log::debug!(
            "Flushed {} collections, {} batches written, {} failed",
            summary.collections,
            summary.batches_written,
            summary.batches_failed
        );
        metadata.map(|_| summary)
    }

    /// Stops the workers of deleted collections and waits for each of them
    /// to clear memory and purge its files.
    fn stop_workers(&self, collections: &[Collection]) {
        for collection in collections {
            if let Err(err) = self
                .broker
                .submit_and_wait(collection.database(), collection.name(), Event::StopWorker)
            {
                log::warn!(
                    "Failed to stop worker of {}/{}: {}",
                    collection.database(),
                    collection.name(),
                    err
                );
            }
        }
    }

    fn close(&self) -> DocketResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.scheduler.stop();
        let flushed = self.flush_all_and_wait();
        self.broker.shutdown();

        let summary = flushed?;
        if summary.failed_collections > 0 || summary.batches_failed > 0 {
            log::error!(
                "Docket closed with {} unflushed batches in {} collections",
                summary.batches_failed,
                summary.failed_collections
            );
            return Err(DocketError::new(
                "Some batches could not be written while closing",
                ErrorKind::WriteFailure,
            ));
        }
        log::info!("Docket closed");
        Ok(())
    }
}

impl Drop for DocketInner {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("Error while closing Docket: {}", err);
        }
    }
}

fn unexpected_outcome(event: &str, outcome: &EventOutcome) -> DocketError {
    DocketError::new(
        &format!("Unexpected outcome of {} event: {:?}", event, outcome),
        ErrorKind::InternalError,
    )
}
