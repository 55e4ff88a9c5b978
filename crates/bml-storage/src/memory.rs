use crate::document::StoreDocument;
use bml_core::{ItemId, StoreError, TagClass, TagStore, TaggedItem};
use std::sync::{Mutex, MutexGuard};

/// In-process tag store. Backs tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_item(&self, collection: &str, item: impl Into<ItemId>) -> Result<bool, StoreError> {
        let item = item.into();
        Ok(self.lock()?.create_item(collection, &item))
    }

    pub fn seed(
        &self,
        collection: &str,
        item: impl Into<ItemId>,
        tags: &[&str],
    ) -> Result<(), StoreError> {
        let item = item.into();
        self.lock()?.seed(collection, &item, tags);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreDocument>, StoreError> {
        self.doc
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl TagStore for MemoryTagStore {
    async fn list_tagged_items(
        &self,
        collection: &str,
        tag_prefix: &str,
    ) -> Result<Vec<TaggedItem>, StoreError> {
        Ok(self.lock()?.list(collection, tag_prefix))
    }

    async fn get_tags(&self, collection: &str, item: &ItemId) -> Result<Vec<String>, StoreError> {
        self.lock()?.tags(collection, item)
    }

    async fn add_tag(&self, collection: &str, item: &ItemId, tag: &str) -> Result<(), StoreError> {
        self.lock()?.add_tag(collection, item, tag).map(|_| ())
    }

    async fn remove_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> Result<(), StoreError> {
        self.lock()?.remove_tag(collection, item, tag).map(|_| ())
    }

    async fn ensure_tag_class(&self, collection: &str, class: &TagClass) -> Result<(), StoreError> {
        self.lock()?.ensure_class(collection, class);
        Ok(())
    }
}
