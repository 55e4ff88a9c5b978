#![allow(dead_code)]

use bml_core::{ItemId, StoreError, TagClass, TagStore, TaggedItem};
use bml_ordering::{EngineConfig, OrderingEngine};
use bml_storage::MemoryTagStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const COLLECTION: &str = "repo";

/// Memory store wrapper that can fail or stall selected calls.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryTagStore,
    fail_add_prefix: Mutex<Option<String>>,
    fail_get_items: Mutex<Vec<ItemId>>,
    fail_removals: Mutex<Vec<(ItemId, String)>>,
    stall_lists: Mutex<Option<Duration>>,
    add_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryTagStore {
        &self.inner
    }

    pub fn seed(&self, item: u64, tags: &[&str]) {
        self.inner.seed(COLLECTION, item, tags).expect("seed");
    }

    pub fn fail_adds_with_prefix(&self, prefix: &str) {
        *self.fail_add_prefix.lock().expect("lock") = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.fail_add_prefix.lock().expect("lock") = None;
        self.fail_get_items.lock().expect("lock").clear();
        self.fail_removals.lock().expect("lock").clear();
        *self.stall_lists.lock().expect("lock") = None;
    }

    pub fn fail_gets_for(&self, item: u64) {
        self.fail_get_items
            .lock()
            .expect("lock")
            .push(ItemId::from(item));
    }

    pub fn fail_removal_of(&self, item: u64, tag: &str) {
        self.fail_removals
            .lock()
            .expect("lock")
            .push((ItemId::from(item), tag.to_string()));
    }

    pub fn stall_lists(&self, delay: Duration) {
        *self.stall_lists.lock().expect("lock") = Some(delay);
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub async fn tags(&self, item: u64) -> Vec<String> {
        let mut tags = self
            .inner
            .get_tags(COLLECTION, &ItemId::from(item))
            .await
            .expect("tags");
        tags.sort();
        tags
    }
}

impl TagStore for FlakyStore {
    async fn list_tagged_items(
        &self,
        collection: &str,
        tag_prefix: &str,
    ) -> Result<Vec<TaggedItem>, StoreError> {
        let stall = *self.stall_lists.lock().expect("lock");
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_tagged_items(collection, tag_prefix).await
    }

    async fn get_tags(&self, collection: &str, item: &ItemId) -> Result<Vec<String>, StoreError> {
        if self.fail_get_items.lock().expect("lock").contains(item) {
            return Err(StoreError::Unavailable(format!("injected get failure for #{item}")));
        }
        self.inner.get_tags(collection, item).await
    }

    async fn add_tag(&self, collection: &str, item: &ItemId, tag: &str) -> Result<(), StoreError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_add_prefix.lock().expect("lock").clone();
        if failing.is_some_and(|prefix| tag.starts_with(&prefix)) {
            return Err(StoreError::Unavailable(format!("injected add failure for {tag}")));
        }
        self.inner.add_tag(collection, item, tag).await
    }

    async fn remove_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> Result<(), StoreError> {
        let failing = self
            .fail_removals
            .lock()
            .expect("lock")
            .iter()
            .any(|(failing_item, failing_tag)| failing_item == item && failing_tag == tag);
        if failing {
            return Err(StoreError::Unavailable(format!("injected remove failure for {tag}")));
        }
        self.inner.remove_tag(collection, item, tag).await
    }

    async fn ensure_tag_class(&self, collection: &str, class: &TagClass) -> Result<(), StoreError> {
        self.inner.ensure_tag_class(collection, class).await
    }
}

pub fn engine(store: FlakyStore) -> OrderingEngine<FlakyStore> {
    OrderingEngine::new(store, EngineConfig::default())
}

pub fn id(item: u64) -> ItemId {
    ItemId::from(item)
}
