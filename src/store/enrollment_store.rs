use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use image::RgbImage;
use log::{debug, info};
use crate::config::config::StoreConfig;
use crate::error::errors::StoreError;
use crate::modules::face_id_client::Embedding;
use crate::store::record_storage::{FilesystemStorage, MemoryStorage, RecordStorage, StoredRecord};
use crate::utils::image::{decode_png, encode_png};
use crate::utils::utils::now_unix_seconds;

/// A decoded enrolled identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub identity: String,
    pub face: RgbImage,
    pub embedding: Embedding,
    /// Unix seconds.
    pub registered_at: f64,
}

fn decode_record(stored: StoredRecord) -> Result<IdentityRecord, StoreError> {
    let face = decode_png(&stored.image).map_err(|e| StoreError::Corrupt {
        identity: stored.identity.clone(),
        message: format!("undecodable face image: {}", e),
    })?;
    let embedding = Embedding::from_bytes(&stored.embedding).map_err(|e| StoreError::Corrupt {
        identity: stored.identity.clone(),
        message: format!("undecodable embedding: {}", e),
    })?;

    Ok(IdentityRecord {
        identity: stored.identity,
        face,
        embedding,
        registered_at: stored.registered_at,
    })
}

/// Identity keyed store of enrolled faces.
///
/// Operations on the same identity are serialized by a per-identity async
/// lock, operations on different identities run concurrently. Storage and
/// image coding run on tokio's blocking pool. Lock entries are dropped once
/// the last operation on an identity finishes.
pub struct EnrollmentStore {
    storage: Arc<dyn RecordStorage>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EnrollmentStore {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        EnrollmentStore {
            storage,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        EnrollmentStore::new(Arc::new(MemoryStorage::new()))
    }

    /// open returns a durable store rooted at the configured directory.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let storage = FilesystemStorage::open(&config.root)?;
        Ok(EnrollmentStore::new(Arc::new(storage)))
    }

    fn lock_for(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(identity.to_string()).or_default().clone()
    }

    /// release drops the lock entry of `identity` once no other task holds or
    /// waits on it.
    fn release(&self, identity: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // one reference in the map and one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }

    /// locked runs `work` on a blocking thread while holding the lock of
    /// `identity`. The guard moves with the work, so the lock stays held until
    /// the storage call returns even if the caller is dropped.
    async fn locked<T, F>(&self, identity: &str, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStorage) -> Result<T, StoreError> + Send + 'static,
    {
        let lock = self.lock_for(identity);
        let guard = lock.clone().lock_owned().await;
        let storage = self.storage.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work(storage.as_ref())
        }).await;
        self.release(identity, lock);
        result?
    }

    /// commit stores the face and embedding for `identity`, replacing any
    /// previous record.
    ///
    /// # Arguments
    /// * `identity` - enrolled name, case sensitive
    /// * `face` - aligned face crop
    /// * `embedding` - embedding of `face`
    ///
    /// # Returns
    /// * `Result<IdentityRecord, StoreError>` - the record as committed
    pub async fn commit(&self, identity: &str, face: &RgbImage, embedding: &Embedding) -> Result<IdentityRecord, StoreError> {
        let record = IdentityRecord {
            identity: identity.to_string(),
            face: face.clone(),
            embedding: embedding.clone(),
            registered_at: 0.0,
        };
        let record = self.locked(identity, move |storage| {
            let image = encode_png(&record.face)?;
            let registered_at = now_unix_seconds();
            storage.put(StoredRecord {
                identity: record.identity.clone(),
                image,
                embedding: record.embedding.to_bytes(),
                registered_at,
            })?;
            Ok(IdentityRecord { registered_at, ..record })
        }).await?;
        info!("enrolled identity '{}'", identity);
        Ok(record)
    }

    /// load returns the current record of `identity`, or `None` when it is not
    /// enrolled.
    pub async fn load(&self, identity: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let owned = identity.to_string();
        let record = self.locked(identity, move |storage| {
            match storage.get(&owned)? {
                None => Ok(None),
                Some(stored) => decode_record(stored).map(Some),
            }
        }).await?;
        if record.is_none() {
            debug!("identity '{}' is not enrolled", identity);
        }
        Ok(record)
    }

    pub fn contains(&self, identity: &str) -> Result<bool, StoreError> {
        self.storage.contains(identity)
    }

    pub fn identities(&self) -> Result<Vec<String>, StoreError> {
        self.storage.identities()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use crate::config::config::StoreConfig;
    use crate::modules::face_id_client::Embedding;
    use crate::store::enrollment_store::EnrollmentStore;

    fn face(value: u8) -> RgbImage {
        RgbImage::from_pixel(12, 10, Rgb([value, value / 2, 255 - value]))
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let store = EnrollmentStore::in_memory();
        assert!(store.load("alice").await.unwrap().is_none());

        let embedding = Embedding::new(vec![0.1, 0.2, 0.3]);
        let committed = store.commit("alice", &face(40), &embedding).await.unwrap();
        let loaded = store.load("alice").await.unwrap().unwrap();

        assert_eq!(loaded, committed);
        assert_eq!(loaded.face, face(40));
        assert!(store.contains("alice").unwrap());
        assert!(!store.contains("Alice").unwrap());
        assert_eq!(store.identities().unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_recommit_replaces() {
        let store = EnrollmentStore::in_memory();
        store.commit("alice", &face(40), &Embedding::new(vec![1.0, 0.0])).await.unwrap();
        store.commit("alice", &face(90), &Embedding::new(vec![0.0, 1.0])).await.unwrap();

        let loaded = store.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded.embedding, Embedding::new(vec![0.0, 1.0]));
        assert_eq!(loaded.face, face(90));
        assert_eq!(store.identities().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filesystem_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig { root: dir.path().to_path_buf() };
        {
            let store = EnrollmentStore::open(&config).unwrap();
            store.commit("bob", &face(7), &Embedding::new(vec![0.5, -0.5, 1.5])).await.unwrap();
        }

        let store = EnrollmentStore::open(&config).unwrap();
        let loaded = store.load("bob").await.unwrap().unwrap();
        assert_eq!(loaded.embedding, Embedding::new(vec![0.5, -0.5, 1.5]));
        assert_eq!(loaded.face, face(7));
        assert!(loaded.registered_at > 0.0);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let store = EnrollmentStore::in_memory();
        for name in ["alice", "bob", "carol"] {
            store.commit(name, &face(40), &Embedding::new(vec![1.0])).await.unwrap();
            store.load(name).await.unwrap();
        }
        store.load("nobody").await.unwrap();

        assert!(store.locks.lock().unwrap().is_empty());
        assert_eq!(store.identities().unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commit_keeps_lock_map_bounded() {
        let store = Arc::new(EnrollmentStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("user-{}", i % 4);
                store.commit(&name, &face(i as u8), &Embedding::new(vec![i as f32])).await.unwrap();
                store.load(&name).await.unwrap().unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(store.locks.lock().unwrap().is_empty());
        assert_eq!(store.identities().unwrap().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commit_and_load_never_tear() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EnrollmentStore::open(&StoreConfig { root: dir.path().to_path_buf() }).unwrap());
        let a = (face(10), Embedding::new(vec![1.0, 0.0, 0.0]));
        let b = (face(200), Embedding::new(vec![0.0, 1.0, 0.0]));
        store.commit("carol", &a.0, &a.1).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let (img, emb) = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    store.commit("carol", &img, &emb).await.unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let store = store.clone();
            let (a, b) = (a.clone(), b.clone());
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let loaded = store.load("carol").await.unwrap().unwrap();
                    let consistent = (loaded.face == a.0 && loaded.embedding == a.1)
                        || (loaded.face == b.0 && loaded.embedding == b.1);
                    assert!(consistent, "observed a torn record");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
