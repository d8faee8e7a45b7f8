//! Durable storage for persisted session state

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::{error, io};

#[cfg(feature = "file")]
use std::path::PathBuf;

/// The error type returned by storage operations
pub type StoreError = Box<dyn error::Error + Send + Sync + 'static>;

/// An asynchronous store for opaque session records
///
/// A store owns one namespace; `delete_all` erases every record in it,
/// not just the one under the session key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a record under the given key
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Retrieves the record under the given key, if one exists
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Erases every record in the store's namespace
    async fn delete_all(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).save(key, bytes).await
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(key).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        (**self).delete_all().await
    }
}

/// A store keeping each record in a file inside a namespace directory
#[cfg(feature = "file")]
#[cfg_attr(docsrs, doc(cfg(feature = "file")))]
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
}

#[cfg(feature = "file")]
impl FileSessionStore {
    /// Constructs a store rooted at the given directory
    ///
    /// The directory is created on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[cfg(feature = "file")]
#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(&self.dir).await?;

        let mut file_opts = tokio::fs::OpenOptions::new();
        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        file_opts.mode(0o600);

        let mut file = file_opts.open(self.path_for(key)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// An in-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemorySessionStore {
    /// Constructs an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.records().insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records().get(key).cloned())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.records().clear();
        Ok(())
    }
}
