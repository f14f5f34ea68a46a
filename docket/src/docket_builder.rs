use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::docket::Docket;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult};
use crate::store::StorageProvider;

/// Fluent builder for [Docket].
///
/// The first invalid setting is remembered and returned by [DocketBuilder::open].
///
/// ```rust,ignore
/// let docket = Docket::builder()
///     .storage_path("/var/lib/docket")
///     .batch_size(5_000)
///     .flush_interval(Duration::from_secs(10))
///     .open()?;
/// ```
#[derive(Default)]
pub struct DocketBuilder {
    error: Option<DocketError>,
    config: DocketConfig,
}

impl DocketBuilder {
    pub fn new() -> Self {
        DocketBuilder {
            error: None,
            config: DocketConfig::new(),
        }
    }

    pub fn storage_path<P: AsRef<Path>>(self, path: P) -> Self {
        self.apply(|config| config.set_storage_path(path))
    }

    pub fn storage_provider(self, provider: Arc<dyn StorageProvider>) -> Self {
        self.apply(|config| config.set_storage_provider(provider))
    }

    pub fn batch_size(self, size: usize) -> Self {
        self.apply(|config| config.set_batch_size(size))
    }

    pub fn intake_capacity(self, capacity: usize) -> Self {
        self.apply(|config| config.set_intake_capacity(capacity))
    }

    pub fn collection_channel_capacity(self, capacity: usize) -> Self {
        self.apply(|config| config.set_collection_channel_capacity(capacity))
    }

    pub fn flush_interval(self, interval: Duration) -> Self {
        self.apply(|config| config.set_flush_interval(interval))
    }

    pub fn filter_workers(self, workers: usize) -> Self {
        self.apply(|config| config.set_filter_workers(workers))
    }

    pub fn filter_default_limit(self, limit: usize) -> Self {
        self.apply(|config| config.set_filter_default_limit(limit))
    }

    pub fn dispatcher_restart_delay(self, delay: Duration) -> Self {
        self.apply(|config| config.set_dispatcher_restart_delay(delay))
    }

    pub fn schema_version(self, version: u32) -> Self {
        self.apply(|config| config.set_schema_version(version))
    }

    /// Loads any persisted state and starts the pipeline.
    pub fn open(self) -> DocketResult<Docket> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Docket::open(self.config)
    }

    fn apply<F>(mut self, setter: F) -> Self
    where
        F: FnOnce(&DocketConfig) -> DocketResult<()>,
    {
        if self.error.is_none() {
            if let Err(err) = setter(&self.config) {
                self.error = Some(err);
            }
        }
        self
    }
}
