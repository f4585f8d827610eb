// # File RRset Store
//
// File-based implementation of RrsetStore with crash recovery.
//
// ## Purpose
//
// Keeps domains and RRsets across daemon restarts and crashes.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// A mutation is applied to a copy of the table, written to disk, and only
// then made visible. A failed write leaves both disk and memory unchanged.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "zones": {
//     "example.com": {
//       "domain": { "name": "example.com", "owner": "alice", "minimum_ttl": 3600, ... },
//       "rrsets": [
//         { "subname": "www", "type": "A", "ttl": 3600, "records": ["192.0.2.1"], ... }
//       ]
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::Zones;
use crate::Error;
use crate::model::{Domain, Rrset, RrsetFilter, RrsetKey};
use crate::traits::RrsetStore;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based RRset store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use rrset_core::{Domain, FileRrsetStore, RrsetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRrsetStore::new("/var/lib/rrsetd/zones.json").await?;
///     store.create_domain(&Domain::new("example.com", "alice", 3600)).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRrsetStore {
    path: PathBuf,
    state: Arc<RwLock<Zones>>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(flatten)]
    zones: Zones,
}

impl FileRrsetStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing store file
    /// 2. If corruption is detected, try to load from backup
    /// 3. If both fail, start empty
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let zones = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(zones)),
        })
    }

    /// Load the store file, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<Zones, Error> {
        match Self::load(path).await {
            Ok(zones) => {
                tracing::debug!("Loaded store from file: {} RRsets", zones.rrset_count());
                Ok(zones)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(Zones::default());
                }

                match Self::load(&backup_path).await {
                    Ok(zones) => {
                        tracing::info!("Recovered store from backup: {} RRsets", zones.rrset_count());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(zones)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(Zones::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load the store from a file; parse failures surface as `Error::Json`
    async fn load(path: &Path) -> Result<Zones, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Zones::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::storage(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.zones)
    }

    /// Apply a mutation to a copy, persist it, then publish it
    async fn mutate<T>(&self, f: impl FnOnce(&mut Zones) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.write_file(&next).await?;
        *guard = next;
        Ok(out)
    }

    /// Write the table to disk atomically
    async fn write_file(&self, zones: &Zones) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            zones: zones.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::storage(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.flush().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RrsetStore for FileRrsetStore {
    async fn get_domain(&self, name: &str) -> Result<Option<Domain>, Error> {
        Ok(self.state.read().await.domain(name))
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), Error> {
        self.mutate(|zones| zones.create_domain(domain)).await
    }

    async fn delete_domain(&self, name: &str) -> Result<bool, Error> {
        if self.state.read().await.domain(name).is_none() {
            return Ok(false);
        }
        self.mutate(|zones| Ok(zones.delete_domain(name))).await
    }

    async fn mark_published(&self, name: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.mutate(|zones| zones.mark_published(name, at)).await
    }

    async fn get(&self, domain: &str, key: &RrsetKey) -> Result<Option<Rrset>, Error> {
        Ok(self.state.read().await.get(domain, key))
    }

    async fn list(&self, domain: &str, filter: &RrsetFilter) -> Result<Vec<Rrset>, Error> {
        Ok(self.state.read().await.list(domain, filter))
    }

    async fn upsert(
        &self,
        domain: &str,
        key: &RrsetKey,
        ttl: u32,
        records: BTreeSet<String>,
    ) -> Result<Option<Rrset>, Error> {
        self.mutate(|zones| zones.upsert(domain, key, ttl, records)).await
    }

    async fn restore(&self, domain: &str, key: &RrsetKey, previous: Option<Rrset>) -> Result<(), Error> {
        self.mutate(|zones| zones.restore(domain, key, previous)).await
    }

    async fn flush(&self) -> Result<(), Error> {
        let zones = self.state.read().await.clone();
        self.write_file(&zones).await
    }
}
