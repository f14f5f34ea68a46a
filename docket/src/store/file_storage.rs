use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::common::TEMP_FILE_EXTENSION;
use crate::errors::DocketResult;
use crate::store::StorageProvider;

/// [StorageProvider] over the local file system.
///
/// A write goes to a sibling temporary file which is synced and then renamed
/// over the target, so readers never see a partially written record.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: &Path) -> DocketResult<Self> {
        fs::create_dir_all(root).map_err(|err| {
            log::error!("Failed to create storage root {}: {}", root.display(), err);
            err
        })?;
        log::info!("Using file storage at {}", root.display());
        Ok(FileStorage {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn temp_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path.with_extension(format!("{}.{}", ext, TEMP_FILE_EXTENSION)),
        None => path.with_extension(TEMP_FILE_EXTENSION),
    }
}

impl StorageProvider for FileStorage {
    fn write(&self, path: &Path, bytes: &[u8]) -> DocketResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = temp_path(path);
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        if let Err(err) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> DocketResult<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list(&self, dir: &Path) -> DocketResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn remove_all(&self, dir: &Path) -> DocketResult<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
