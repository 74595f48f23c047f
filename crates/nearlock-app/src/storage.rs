//! CBOR file preference store.
//!
//! The whole preference map lives in memory and is written back to disk on
//! every change. Writes go to a temporary sibling file that is renamed over
//! the real one, so a crash never leaves a torn file behind.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use nearlock_core::{PrefDict, PreferenceStore, StorageError};
use tracing::debug;

use crate::error::RuntimeError;

type PrefMap = BTreeMap<String, PrefDict>;

/// Preference store persisted to a CBOR file
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: Arc<PathBuf>,
    cache: Arc<RwLock<PrefMap>>,
}

impl FilePreferences {
    /// Open the store at `path`. A missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let path = path.into();
        let cache = load(&path)
            .map_err(|source| RuntimeError::OpenPreferences { path: path.clone(), source })?;
        debug!(path = %path.display(), keys = cache.len(), "preferences loaded");

        Ok(Self { path: Arc::new(path), cache: Arc::new(RwLock::new(cache)) })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferences {
    fn dict(&self, key: &str) -> Option<PrefDict> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn set_dict(&self, key: &str, dict: PrefDict) -> Result<(), StorageError> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(key.to_owned(), dict);
        save(&self.path, &cache)
    }
}

fn load(path: &Path) -> Result<PrefMap, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(PrefMap::new()),
        Err(error) => return Err(error.into()),
    };
    ciborium::de::from_reader(BufReader::new(file))
        .map_err(|error| StorageError::Encoding(error.to_string()))
}

fn save(path: &Path, prefs: &PrefMap) -> Result<(), StorageError> {
    let temp_path = path.with_extension("cbor.tmp");
    let mut writer = BufWriter::new(File::create(&temp_path)?);
    ciborium::ser::into_writer(prefs, &mut writer)
        .map_err(|error| StorageError::Encoding(error.to_string()))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
