//! Configuration management for Docket.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::common::{
    DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION_CHANNEL_CAPACITY, DEFAULT_DISPATCHER_RESTART_DELAY_MS,
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_INTAKE_CAPACITY, FILTER_DEFAULT_LIMIT, FILTER_DEFAULT_WORKERS,
    INITIAL_SCHEMA_VERSION,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::FilterExecutor;
use crate::pipeline::BrokerConfig;
use crate::store::{Storage, StorageLayout, StorageProvider};

/// Settings of a Docket instance.
///
/// Cloning is cheap and all clones share the same values. Every setter fails
/// with [ErrorKind::InvalidOperation] once the database has been opened.
///
/// | setting | default |
/// |---|---|
/// | storage path | none, documents are kept in memory |
/// | batch size | 10 000 documents |
/// | intake capacity | 100 000 requests |
/// | collection channel capacity | 10 000 requests |
/// | flush interval | 30 s, zero disables the ticker |
/// | filter workers | 4 |
/// | filter default limit | 1 000 |
/// | dispatcher restart delay | 2 s |
/// | schema version | 1 |
#[derive(Clone)]
pub struct DocketConfig {
    inner: Arc<DocketConfigInner>,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DocketConfig {
    pub fn new() -> Self {
        DocketConfig {
            inner: Arc::new(DocketConfigInner::new()),
        }
    }

    pub fn storage_path(&self) -> Option<PathBuf> {
        self.inner.storage_path.get().cloned()
    }

    pub fn set_storage_path<P: AsRef<Path>>(&self, path: P) -> DocketResult<()> {
        self.inner.check_not_configured("storage path")?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            log::error!("Storage path cannot be empty");
            return Err(DocketError::new("Storage path cannot be empty", ErrorKind::InvalidOperation));
        }
        if self.inner.storage_path.set(path.to_path_buf()).is_err() {
            log::error!("Storage path is already set");
            return Err(DocketError::new("Storage path is already set", ErrorKind::InvalidOperation));
        }
        Ok(())
    }

    /// Replaces the storage backend. Paths are still derived from the
    /// storage path, or are relative when none is set.
    pub fn set_storage_provider(&self, provider: Arc<dyn StorageProvider>) -> DocketResult<()> {
        self.inner.check_not_configured("storage provider")?;
        if self.inner.storage_provider.set(provider).is_err() {
            log::error!("Storage provider is already set");
            return Err(DocketError::new("Storage provider is already set", ErrorKind::InvalidOperation));
        }
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size.load(Ordering::Relaxed)
    }

    pub fn set_batch_size(&self, size: usize) -> DocketResult<()> {
        self.inner.set_count("batch size", &self.inner.batch_size, size)
    }

    pub fn intake_capacity(&self) -> usize {
        self.inner.intake_capacity.load(Ordering::Relaxed)
    }

    pub fn set_intake_capacity(&self, capacity: usize) -> DocketResult<()> {
        self.inner.set_count("intake capacity", &self.inner.intake_capacity, capacity)
    }

    pub fn collection_channel_capacity(&self) -> usize {
        self.inner.channel_capacity.load(Ordering::Relaxed)
    }

    pub fn set_collection_channel_capacity(&self, capacity: usize) -> DocketResult<()> {
        self.inner
            .set_count("collection channel capacity", &self.inner.channel_capacity, capacity)
    }

    pub fn filter_workers(&self) -> usize {
        self.inner.filter_workers.load(Ordering::Relaxed)
    }

    pub fn set_filter_workers(&self, workers: usize) -> DocketResult<()> {
        self.inner.set_count("filter workers", &self.inner.filter_workers, workers)
    }

    pub fn filter_default_limit(&self) -> usize {
        self.inner.filter_default_limit.load(Ordering::Relaxed)
    }

    pub fn set_filter_default_limit(&self, limit: usize) -> DocketResult<()> {
        self.inner
            .set_count("filter default limit", &self.inner.filter_default_limit, limit)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.inner.flush_interval_ms.load(Ordering::Relaxed))
    }

    /// Period of the flush ticker. [Duration::ZERO] disables it.
    pub fn set_flush_interval(&self, interval: Duration) -> DocketResult<()> {
        self.inner.check_not_configured("flush interval")?;
        self.inner
            .flush_interval_ms
            .store(duration_millis(interval), Ordering::Relaxed);
        Ok(())
    }

    pub fn dispatcher_restart_delay(&self) -> Duration {
        Duration::from_millis(self.inner.restart_delay_ms.load(Ordering::Relaxed))
    }

    pub fn set_dispatcher_restart_delay(&self, delay: Duration) -> DocketResult<()> {
        self.inner.check_not_configured("dispatcher restart delay")?;
        self.inner
            .restart_delay_ms
            .store(duration_millis(delay), Ordering::Relaxed);
        Ok(())
    }

    pub fn schema_version(&self) -> u32 {
        self.inner.schema_version.load(Ordering::Relaxed)
    }

    pub fn set_schema_version(&self, version: u32) -> DocketResult<()> {
        self.inner.check_not_configured("schema version")?;
        self.inner.schema_version.store(version, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::Acquire)
    }

    /// Freezes the configuration.
    pub(crate) fn initialize(&self) {
        self.inner.configured.store(true, Ordering::Release);
    }

    pub(crate) fn storage(&self) -> DocketResult<Storage> {
        let path = self.storage_path();
        match (self.inner.storage_provider.get(), path) {
            (Some(provider), path) => {
                let layout = path.map(StorageLayout::new).unwrap_or_default();
                Ok(Storage::with_provider(Arc::clone(provider), layout))
            }
            (None, Some(path)) => Storage::on_disk(path),
            (None, None) => {
                log::info!("No storage path configured, documents are kept in memory");
                Ok(Storage::in_memory())
            }
        }
    }

    pub(crate) fn filter_executor(&self) -> FilterExecutor {
        FilterExecutor::new(self.filter_workers(), self.filter_default_limit())
    }

    pub(crate) fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            intake_capacity: self.intake_capacity(),
            channel_capacity: self.collection_channel_capacity(),
            restart_delay: self.dispatcher_restart_delay(),
        }
    }
}

impl std::fmt::Debug for DocketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocketConfig")
            .field("storage_path", &self.storage_path())
            .field("batch_size", &self.batch_size())
            .field("intake_capacity", &self.intake_capacity())
            .field("collection_channel_capacity", &self.collection_channel_capacity())
            .field("flush_interval", &self.flush_interval())
            .field("filter_workers", &self.filter_workers())
            .field("filter_default_limit", &self.filter_default_limit())
            .field("schema_version", &self.schema_version())
            .finish()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct DocketConfigInner {
    configured: AtomicBool,
    storage_path: OnceLock<PathBuf>,
    storage_provider: OnceLock<Arc<dyn StorageProvider>>,
    batch_size: AtomicUsize,
    intake_capacity: AtomicUsize,
    channel_capacity: AtomicUsize,
    filter_workers: AtomicUsize,
    filter_default_limit: AtomicUsize,
    flush_interval_ms: AtomicU64,
    restart_delay_ms: AtomicU64,
    schema_version: AtomicU32,
}

impl DocketConfigInner {
    fn new() -> Self {
        DocketConfigInner {
            configured: AtomicBool::new(false),
            storage_path: OnceLock::new(),
            storage_provider: OnceLock::new(),
            batch_size: AtomicUsize::new(DEFAULT_BATCH_SIZE),
            intake_capacity: AtomicUsize::new(DEFAULT_INTAKE_CAPACITY),
            channel_capacity: AtomicUsize::new(DEFAULT_COLLECTION_CHANNEL_CAPACITY),
            filter_workers: AtomicUsize::new(FILTER_DEFAULT_WORKERS),
            filter_default_limit: AtomicUsize::new(FILTER_DEFAULT_LIMIT),
            flush_interval_ms: AtomicU64::new(DEFAULT_FLUSH_INTERVAL_SECS * 1000),
            restart_delay_ms: AtomicU64::new(DEFAULT_DISPATCHER_RESTART_DELAY_MS),
            schema_version: AtomicU32::new(INITIAL_SCHEMA_VERSION),
        }
    }

    fn check_not_configured(&self, setting: &str) -> DocketResult<()> {
        if self.configured.load(Ordering::Acquire) {
            log::error!("The {} cannot be changed after the database is opened", setting);
            return Err(DocketError::new(
                &format!("The {} cannot be changed after the database is opened", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    fn set_count(&self, setting: &str, slot: &AtomicUsize, value: usize) -> DocketResult<()> {
        self.check_not_configured(setting)?;
        if value == 0 {
            log::error!("The {} must be greater than zero", setting);
            return Err(DocketError::new(
                &format!("The {} must be greater than zero", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        slot.store(value, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    #[test]
    fn defaults() {
        let config = DocketConfig::new();
        assert_eq!(config.storage_path(), None);
        assert_eq!(config.batch_size(), 10_000);
        assert_eq!(config.intake_capacity(), 100_000);
        assert_eq!(config.collection_channel_capacity(), 10_000);
        assert_eq!(config.flush_interval(), Duration::from_secs(30));
        assert_eq!(config.filter_workers(), 4);
        assert_eq!(config.filter_default_limit(), 1000);
        assert_eq!(config.dispatcher_restart_delay(), Duration::from_secs(2));
        assert_eq!(config.schema_version(), 1);
    }

    #[test]
    fn setters_update_values() {
        let config = DocketConfig::new();
        config.set_batch_size(5).unwrap();
        config.set_flush_interval(Duration::ZERO).unwrap();
        config.set_storage_path("/tmp/docket").unwrap();
        assert_eq!(config.batch_size(), 5);
        assert_eq!(config.flush_interval(), Duration::ZERO);
        assert_eq!(config.storage_path(), Some(PathBuf::from("/tmp/docket")));
    }

    #[test]
    fn clones_share_values() {
        let config = DocketConfig::new();
        let clone = config.clone();
        clone.set_filter_workers(8).unwrap();
        assert_eq!(config.filter_workers(), 8);
    }

    #[test]
    fn zero_counts_are_rejected() {
        let config = DocketConfig::new();
        let err = config.set_batch_size(0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert_eq!(config.batch_size(), 10_000);
    }

    #[test]
    fn storage_path_is_set_once() {
        let config = DocketConfig::new();
        config.set_storage_path("/a").unwrap();
        assert!(config.set_storage_path("/b").is_err());
        assert!(config.set_storage_path("").is_err());
    }

    #[test]
    fn frozen_after_initialize() {
        let config = DocketConfig::new();
        config.initialize();
        assert!(config.is_configured());
        let err = config.set_batch_size(10).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert!(config.set_flush_interval(Duration::from_secs(1)).is_err());
        assert!(config.set_schema_version(2).is_err());
    }

    #[test]
    fn custom_provider_is_used() {
        let memory = MemoryStorage::new();
        let config = DocketConfig::new();
        config.set_storage_provider(Arc::new(memory.clone())).unwrap();

        let storage = config.storage().unwrap();
        storage
            .purge_collection("db", "coll")
            .unwrap();
        assert_eq!(memory.file_count(), 0);
        assert_eq!(storage.layout(), &StorageLayout::default());
    }
}
