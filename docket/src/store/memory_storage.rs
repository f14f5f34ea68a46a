use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::store::StorageProvider;

/// Volatile [StorageProvider] keeping every file in a concurrent map.
///
/// Used when no storage path is configured. Writes can be made to fail on
/// purpose to exercise the flush error path.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryStorageInner>,
}

#[derive(Default)]
struct MemoryStorageInner {
    files: DashMap<PathBuf, Vec<u8>>,
    fail_writes: AtomicBool,
    fail_file_name: RwLock<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write fails with [ErrorKind::DiskFull].
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Release);
    }

    /// When set, only writes to files with this name fail.
    pub fn set_fail_writes_to(&self, file_name: Option<&str>) {
        *self.inner.fail_file_name.write() = file_name.map(str::to_string);
    }

    pub fn file_count(&self) -> usize {
        self.inner.files.len()
    }
}

impl StorageProvider for MemoryStorage {
    fn write(&self, path: &Path, bytes: &[u8]) -> DocketResult<()> {
        let failing_file = self
            .inner
            .fail_file_name
            .read()
            .as_deref()
            .is_some_and(|name| path.file_name().is_some_and(|f| f == name));
        if failing_file || self.inner.fail_writes.load(Ordering::Acquire) {
            return Err(DocketError::new(
                &format!("No space left to write {}", path.display()),
                ErrorKind::DiskFull,
            ));
        }
        self.inner.files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &Path) -> DocketResult<Vec<u8>> {
        self.inner
            .files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DocketError::new(&format!("{} does not exist", path.display()), ErrorKind::NotFound))
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.files.contains_key(path)
    }

    fn list(&self, dir: &Path) -> DocketResult<Vec<PathBuf>> {
        let children: BTreeSet<PathBuf> = self
            .inner
            .files
            .iter()
            .filter_map(|entry| {
                let relative = entry.key().strip_prefix(dir).ok()?;
                match relative.components().next()? {
                    Component::Normal(name) => Some(dir.join(name)),
                    _ => None,
                }
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    fn remove_all(&self, dir: &Path) -> DocketResult<()> {
        self.inner.files.retain(|path, _| !path.starts_with(dir));
        Ok(())
    }
}
