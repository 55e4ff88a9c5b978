use crate::document::StoreDocument;
use bml_core::{ItemId, StoreError, TagClass, TagStore, TaggedItem};
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Tag store persisted as one JSON document on disk.
///
/// Each call is a full read (and, for mutations, a full rewrite) under an
/// advisory `fs2` lock on `<path>.lock`, so separate processes can share the
/// file. Blocking I/O runs on the tokio blocking pool.
#[derive(Debug, Clone)]
pub struct FileTagStore {
    inner: Arc<FileStoreInner>,
}

#[derive(Debug)]
struct FileStoreInner {
    path: PathBuf,
    lock_path: PathBuf,
    local: Mutex<()>,
}

struct FileLockGuard {
    file: File,
}

impl FileLockGuard {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(Self { file })
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileTagStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            inner: Arc::new(FileStoreInner {
                path,
                lock_path: PathBuf::from(lock_name),
                local: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Registers items that do not exist yet; returns how many were created.
    pub async fn create_items(
        &self,
        collection: &str,
        items: Vec<ItemId>,
    ) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        self.mutate(move |doc| {
            Ok(items
                .iter()
                .filter(|item| doc.create_item(&collection, item))
                .count())
        })
        .await
    }

    pub async fn seed(
        &self,
        collection: &str,
        item: impl Into<ItemId>,
        tags: &[&str],
    ) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let item = item.into();
        let tags = tags.iter().map(|tag| tag.to_string()).collect::<Vec<_>>();
        self.mutate(move |doc| {
            let tags = tags.iter().map(String::as_str).collect::<Vec<_>>();
            doc.seed(&collection, &item, &tags);
            Ok(())
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<StoreDocument, StoreError> {
        self.read(|doc| Ok(doc.clone())).await
    }

    async fn read<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreDocument) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let _local = inner.lock_local()?;
            let _guard = FileLockGuard::acquire(&inner.lock_path, false)?;
            let doc = load_document(&inner.path)?;
            op(&doc)
        })
        .await
    }

    async fn mutate<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreDocument) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let _local = inner.lock_local()?;
            let _guard = FileLockGuard::acquire(&inner.lock_path, true)?;
            let mut doc = load_document(&inner.path)?;
            let before = doc.clone();
            let result = op(&mut doc)?;
            if doc != before {
                doc.last_updated = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
                write_document(&inner.path, &doc)?;
            }
            Ok(result)
        })
        .await
    }
}

impl FileStoreInner {
    fn lock_local(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.local
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".to_string()))
    }
}

async fn run_blocking<T, F>(op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task failed: {err}")))?
}

fn load_document(path: &Path) -> Result<StoreDocument, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StoreDocument::default())
        }
        Err(err) => return Err(err.into()),
    };
    if contents.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    serde_json::from_str(&contents)
        .map_err(|err| StoreError::Malformed(format!("{}: {err}", path.display())))
}

fn write_document(path: &Path, doc: &StoreDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(doc)
        .map_err(|err| StoreError::Malformed(format!("serialize store: {err}")))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl TagStore for FileTagStore {
    async fn list_tagged_items(
        &self,
        collection: &str,
        tag_prefix: &str,
    ) -> Result<Vec<TaggedItem>, StoreError> {
        let collection = collection.to_string();
        let tag_prefix = tag_prefix.to_string();
        self.read(move |doc| Ok(doc.list(&collection, &tag_prefix)))
            .await
    }

    async fn get_tags(&self, collection: &str, item: &ItemId) -> Result<Vec<String>, StoreError> {
        let collection = collection.to_string();
        let item = item.clone();
        self.read(move |doc| doc.tags(&collection, &item)).await
    }

    async fn add_tag(&self, collection: &str, item: &ItemId, tag: &str) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let item = item.clone();
        let tag = tag.to_string();
        self.mutate(move |doc| doc.add_tag(&collection, &item, &tag).map(|_| ()))
            .await
    }

    async fn remove_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let item = item.clone();
        let tag = tag.to_string();
        self.mutate(move |doc| doc.remove_tag(&collection, &item, &tag).map(|_| ()))
            .await
    }

    async fn ensure_tag_class(&self, collection: &str, class: &TagClass) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let class = class.clone();
        self.mutate(move |doc| {
            doc.ensure_class(&collection, &class);
            Ok(())
        })
        .await
    }
}
