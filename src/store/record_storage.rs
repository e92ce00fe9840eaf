use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};
use crate::error::errors::StoreError;
use crate::utils::utils::identity_digest;

const RECORDS_DIR: &str = "records";
const BLOBS_DIR: &str = "blobs";
const STAGING_DIR: &str = "staging";

/// Raw bytes of one enrolled identity as handed to a storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub identity: String,
    /// PNG encoded aligned face.
    pub image: Vec<u8>,
    /// Little-endian f32 embedding.
    pub embedding: Vec<u8>,
    pub registered_at: f64,
}

/// Key-value backend of the enrollment store.
///
/// `put` must publish atomically: a concurrent or later `get` sees either the
/// previous record or the new one, never a mix.
pub trait RecordStorage: Send + Sync {
    fn put(&self, record: StoredRecord) -> Result<(), StoreError>;

    fn get(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Sorted names of every stored identity.
    fn identities(&self) -> Result<Vec<String>, StoreError>;

    fn contains(&self, identity: &str) -> Result<bool, StoreError> {
        Ok(self.get(identity)?.is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl RecordStorage for MemoryStorage {
    fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.identity.clone(), record);
        Ok(())
    }

    fn get(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(identity).cloned())
    }

    fn identities(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut identities: Vec<String> = records.keys().cloned().collect();
        identities.sort();
        Ok(identities)
    }

    fn contains(&self, identity: &str) -> Result<bool, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.contains_key(identity))
    }
}

/// On-disk description of one record. Blob paths are relative to the storage root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct RecordManifest {
    identity: String,
    image_path: PathBuf,
    embedding_path: PathBuf,
    embedding_dim: usize,
    registered_at_unix_seconds: f64,
}

/// Durable storage under a root directory.
///
/// Blobs live in `blobs/` under unique names and each identity has a manifest
/// `records/id-<sha256 of identity>.json` pointing at them. Manifests are
/// written in `staging/` and a put only becomes visible when its manifest is
/// renamed into `records/`.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// open creates the directory layout under `root` if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage = FilesystemStorage { root: root.into() };
        for dir in [storage.records_dir(), storage.blobs_dir(), storage.staging_dir()] {
            fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
        }
        let enrolled = storage.identities()?;
        info!("loaded face store at {} with {} enrolled identities", storage.root.display(), enrolled.len());
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn manifest_path(&self, identity: &str) -> PathBuf {
        self.records_dir().join(format!("id-{}.json", identity_digest(identity)))
    }

    /// write_blob writes `bytes` to a new uniquely named file in `blobs/`,
    /// fsyncs it and returns its path relative to the root.
    fn write_blob(&self, prefix: &str, suffix: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let dir = self.blobs_dir();
        let mut tmp = Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&dir)
            .map_err(StoreError::io(&dir))?;
        tmp.write_all(bytes).map_err(StoreError::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;

        let (_, path) = tmp.keep().map_err(|e| StoreError::Io { path: dir.clone(), source: e.error })?;
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        Ok(Path::new(BLOBS_DIR).join(name))
    }

    fn read_manifest(&self, path: &Path) -> Result<Option<RecordManifest>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path)(e)),
        };
        let manifest = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            identity: path.display().to_string(),
            message: format!("unreadable manifest: {}", e),
        })?;
        Ok(Some(manifest))
    }

    fn write_manifest(&self, path: &Path, manifest: &RecordManifest) -> Result<(), StoreError> {
        let dir = self.staging_dir();
        let mut tmp = NamedTempFile::new_in(&dir).map_err(StoreError::io(&dir))?;
        let serialized = serde_json::to_vec_pretty(manifest)?;
        tmp.write_all(&serialized).map_err(StoreError::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;
        tmp.persist(path).map_err(|e| StoreError::Io { path: path.to_path_buf(), source: e.error })?;
        Ok(())
    }

    fn remove_blob(&self, relative: &Path) {
        let path = self.root.join(relative);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to remove blob {}: {}", path.display(), e);
            }
        }
    }

    fn read_blob(&self, identity: &str, relative: &Path) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(relative);
        fs::read(&path).map_err(|e| StoreError::Corrupt {
            identity: identity.to_string(),
            message: format!("cannot read blob {}: {}", path.display(), e),
        })
    }
}

impl RecordStorage for FilesystemStorage {
    fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        let manifest_path = self.manifest_path(&record.identity);
        // an unreadable previous manifest must not block re-enrollment
        let previous = self.read_manifest(&manifest_path).unwrap_or_else(|e| {
            warn!("replacing unreadable record for '{}': {}", record.identity, e);
            None
        });

        let image_path = self.write_blob("img-", ".png", &record.image)?;
        let embedding_path = match self.write_blob("emb-", ".emb", &record.embedding) {
            Ok(path) => path,
            Err(e) => {
                self.remove_blob(&image_path);
                return Err(e)
            }
        };

        let manifest = RecordManifest {
            identity: record.identity.clone(),
            image_path: image_path.clone(),
            embedding_path: embedding_path.clone(),
            embedding_dim: record.embedding.len() / 4,
            registered_at_unix_seconds: record.registered_at,
        };
        if let Err(e) = self.write_manifest(&manifest_path, &manifest) {
            self.remove_blob(&image_path);
            self.remove_blob(&embedding_path);
            return Err(e)
        }
        debug!("published record for '{}' at {}", record.identity, manifest_path.display());

        if let Some(previous) = previous {
            self.remove_blob(&previous.image_path);
            self.remove_blob(&previous.embedding_path);
        }
        Ok(())
    }

    fn get(&self, identity: &str) -> Result<Option<StoredRecord>, StoreError> {
        let manifest = match self.read_manifest(&self.manifest_path(identity))? {
            None => return Ok(None),
            Some(manifest) => manifest,
        };
        if manifest.identity != identity {
            return Err(StoreError::Corrupt {
                identity: identity.to_string(),
                message: format!("manifest belongs to '{}'", manifest.identity),
            })
        }

        let image = self.read_blob(identity, &manifest.image_path)?;
        let embedding = self.read_blob(identity, &manifest.embedding_path)?;
        if embedding.len() != manifest.embedding_dim * 4 {
            return Err(StoreError::Corrupt {
                identity: identity.to_string(),
                message: format!("expected {} embedding values, found {} bytes", manifest.embedding_dim, embedding.len()),
            })
        }

        Ok(Some(StoredRecord {
            identity: manifest.identity,
            image,
            embedding,
            registered_at: manifest.registered_at_unix_seconds,
        }))
    }

    fn identities(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.records_dir();
        let mut identities = Vec::new();
        for entry in fs::read_dir(&dir).map_err(StoreError::io(&dir))? {
            let entry = entry.map_err(StoreError::io(&dir))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("id-") || !name.ends_with(".json") {
                continue
            }
            match self.read_manifest(&entry.path()) {
                Ok(Some(manifest)) => identities.push(manifest.identity),
                Ok(None) => {}
                Err(e) => warn!("skipping record {}: {}", name, e),
            }
        }
        identities.sort();
        Ok(identities)
    }

    fn contains(&self, identity: &str) -> Result<bool, StoreError> {
        Ok(self.manifest_path(identity).is_file())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use tempfile::TempDir;
    use crate::error::errors::StoreError;
    use crate::store::record_storage::{FilesystemStorage, MemoryStorage, RecordStorage, StoredRecord};
    use crate::utils::utils::identity_digest;

    fn record(identity: &str, seed: u8) -> StoredRecord {
        StoredRecord {
            identity: identity.to_string(),
            image: vec![seed; 16],
            embedding: vec![seed; 12],
            registered_at: 1_700_000_000.5,
        }
    }

    fn blob_count(dir: &TempDir) -> usize {
        fs::read_dir(dir.path().join("blobs")).unwrap().count()
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.get("alice").unwrap().is_none());

        storage.put(record("bob", 1)).unwrap();
        storage.put(record("alice", 2)).unwrap();
        storage.put(record("alice", 3)).unwrap();

        assert_eq!(storage.get("alice").unwrap(), Some(record("alice", 3)));
        assert!(storage.contains("bob").unwrap());
        assert_eq!(storage.identities().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_filesystem_round_trip_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = FilesystemStorage::open(dir.path()).unwrap();
            storage.put(record("alice", 7)).unwrap();
            storage.put(record("bob", 8)).unwrap();
        }

        let storage = FilesystemStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("alice").unwrap(), Some(record("alice", 7)));
        assert_eq!(storage.identities().unwrap(), vec!["alice", "bob"]);
        assert!(storage.contains("bob").unwrap());
        assert!(!storage.contains("carol").unwrap());
        assert!(storage.get("carol").unwrap().is_none());
    }

    #[test]
    fn test_filesystem_replace_removes_superseded_blobs() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();

        storage.put(record("alice", 1)).unwrap();
        storage.put(record("alice", 2)).unwrap();

        assert_eq!(storage.get("alice").unwrap(), Some(record("alice", 2)));
        assert_eq!(blob_count(&dir), 2);
    }

    #[test]
    fn test_filesystem_missing_blob_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(record("alice", 1)).unwrap();

        for entry in fs::read_dir(dir.path().join("blobs")).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().map(|e| e == "emb").unwrap_or(false) {
                fs::remove_file(path).unwrap();
            }
        }
        assert!(matches!(storage.get("alice"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_filesystem_ignores_leftover_temp_files() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(record("alice", 1)).unwrap();

        fs::write(dir.path().join("records").join(".tmpA1b2C3"), b"{\"half\": ").unwrap();
        fs::write(dir.path().join("records").join("id-garbage.json"), b"not json").unwrap();

        assert_eq!(storage.identities().unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_filesystem_manifest_names_are_digests() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(record("a/b", 1)).unwrap();

        let name = format!("id-{}.json", identity_digest("a/b"));
        assert_eq!(name.len(), 3 + 64 + 5);
        assert!(dir.path().join("records").join(name).is_file());
        assert_eq!(storage.get("a/b").unwrap().unwrap().identity, "a/b");
    }

    #[test]
    fn test_filesystem_long_identity() {
        let dir = TempDir::new().unwrap();
        let identity = "x".repeat(300);
        {
            let storage = FilesystemStorage::open(dir.path()).unwrap();
            storage.put(record(&identity, 4)).unwrap();
        }

        let storage = FilesystemStorage::open(dir.path()).unwrap();
        assert!(storage.contains(&identity).unwrap());
        assert_eq!(storage.get(&identity).unwrap(), Some(record(&identity, 4)));
        assert_eq!(storage.identities().unwrap(), vec![identity]);
    }

    #[test]
    fn test_filesystem_failed_manifest_write_keeps_previous_record() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(record("alice", 1)).unwrap();

        // a file where the staging directory should be makes the manifest write fail
        let staging = dir.path().join("staging");
        fs::remove_dir_all(&staging).unwrap();
        fs::write(&staging, b"").unwrap();

        assert!(matches!(storage.put(record("alice", 2)), Err(StoreError::Io { .. })));
        assert_eq!(storage.get("alice").unwrap(), Some(record("alice", 1)));
        assert_eq!(storage.identities().unwrap(), vec!["alice"]);
        assert_eq!(blob_count(&dir), 2);
    }

    #[test]
    fn test_filesystem_ignores_orphan_blobs() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(record("alice", 1)).unwrap();

        fs::write(dir.path().join("blobs").join("img-orphan.png"), b"half a png").unwrap();
        fs::write(dir.path().join("blobs").join("emb-orphan.emb"), [0u8; 8]).unwrap();

        assert_eq!(storage.identities().unwrap(), vec!["alice"]);
        assert_eq!(storage.get("alice").unwrap(), Some(record("alice", 1)));
        assert!(!storage.contains("orphan").unwrap());
    }
}
