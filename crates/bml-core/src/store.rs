use crate::tags::{TagClass, TaggedItem};
use crate::ItemId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single store call. Callers treat every variant as transient:
/// the call failed, nothing else can be assumed about remote state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed store data: {0}")]
    Malformed(String),
    #[error("item {item} not found in collection '{collection}'")]
    ItemNotFound { collection: String, item: ItemId },
    #[error("tag class '{tag}' does not exist in collection '{collection}'")]
    UnknownTagClass { collection: String, tag: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// External tag/label store. Every call is independent: there are no
/// transactions and no atomic update across tags or items.
pub trait TagStore: Send + Sync {
    /// Items carrying at least one tag starting with `tag_prefix`. An empty
    /// prefix lists every item in the collection, tagged or not.
    fn list_tagged_items(
        &self,
        collection: &str,
        tag_prefix: &str,
    ) -> impl Future<Output = Result<Vec<TaggedItem>, StoreError>> + Send;

    fn get_tags(
        &self,
        collection: &str,
        item: &ItemId,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn add_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Creates the class when missing; an existing class is left untouched.
    fn ensure_tag_class(
        &self,
        collection: &str,
        class: &TagClass,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: TagStore> TagStore for Arc<S> {
    fn list_tagged_items(
        &self,
        collection: &str,
        tag_prefix: &str,
    ) -> impl Future<Output = Result<Vec<TaggedItem>, StoreError>> + Send {
        (**self).list_tagged_items(collection, tag_prefix)
    }

    fn get_tags(
        &self,
        collection: &str,
        item: &ItemId,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send {
        (**self).get_tags(collection, item)
    }

    fn add_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).add_tag(collection, item, tag)
    }

    fn remove_tag(
        &self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).remove_tag(collection, item, tag)
    }

    fn ensure_tag_class(
        &self,
        collection: &str,
        class: &TagClass,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).ensure_tag_class(collection, class)
    }
}
