use bml_core::tags::{is_priority_tag, is_stage_tag, priority_text, stage_from_tag};
use bml_core::{ItemId, PriorityKey, StoreError, TagClass, TaggedItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PLAIN_TAG_COLOR: &str = "ededed";

/// Persisted shape shared by the memory and file stores.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionDocument>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDocument {
    #[serde(default)]
    pub classes: BTreeMap<String, TagClass>,
    #[serde(default)]
    pub items: BTreeMap<ItemId, Vec<String>>,
}

impl StoreDocument {
    pub fn collection(&self, collection: &str) -> Option<&CollectionDocument> {
        self.collections.get(collection)
    }

    fn collection_mut(&mut self, collection: &str) -> &mut CollectionDocument {
        self.collections.entry(collection.to_string()).or_default()
    }

    /// Registers an item; returns false when it already existed.
    pub fn create_item(&mut self, collection: &str, item: &ItemId) -> bool {
        let items = &mut self.collection_mut(collection).items;
        if items.contains_key(item) {
            return false;
        }
        items.insert(item.clone(), Vec::new());
        true
    }

    pub fn list(&self, collection: &str, tag_prefix: &str) -> Vec<TaggedItem> {
        let Some(doc) = self.collection(collection) else {
            return Vec::new();
        };
        doc.items
            .iter()
            .filter(|(_, tags)| tag_prefix.is_empty() || tags.iter().any(|t| t.starts_with(tag_prefix)))
            .map(|(id, tags)| TaggedItem::new(id.clone(), tags.clone()))
            .collect()
    }

    pub fn tags(&self, collection: &str, item: &ItemId) -> Result<Vec<String>, StoreError> {
        self.collection(collection)
            .and_then(|doc| doc.items.get(item))
            .cloned()
            .ok_or_else(|| item_not_found(collection, item))
    }

    /// Returns whether the tag was newly attached.
    pub fn add_tag(
        &mut self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> Result<bool, StoreError> {
        let doc = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| item_not_found(collection, item))?;
        if !doc.classes.contains_key(tag) {
            return Err(StoreError::UnknownTagClass {
                collection: collection.to_string(),
                tag: tag.to_string(),
            });
        }
        let tags = doc
            .items
            .get_mut(item)
            .ok_or_else(|| item_not_found(collection, item))?;
        if tags.iter().any(|existing| existing == tag) {
            return Ok(false);
        }
        tags.push(tag.to_string());
        Ok(true)
    }

    /// Returns whether a tag was detached. Removing an absent tag is a no-op.
    pub fn remove_tag(
        &mut self,
        collection: &str,
        item: &ItemId,
        tag: &str,
    ) -> Result<bool, StoreError> {
        let tags = self
            .collections
            .get_mut(collection)
            .and_then(|doc| doc.items.get_mut(item))
            .ok_or_else(|| item_not_found(collection, item))?;
        let before = tags.len();
        tags.retain(|existing| existing != tag);
        Ok(tags.len() != before)
    }

    /// Returns whether the class was created.
    pub fn ensure_class(&mut self, collection: &str, class: &TagClass) -> bool {
        let classes = &mut self.collection_mut(collection).classes;
        if classes.contains_key(&class.name) {
            return false;
        }
        classes.insert(class.name.clone(), class.clone());
        true
    }

    /// Test and bootstrap helper: registers the item with `tags`, creating
    /// any missing classes on the way.
    pub fn seed(&mut self, collection: &str, item: &ItemId, tags: &[&str]) {
        self.create_item(collection, item);
        for tag in tags {
            self.ensure_class(collection, &default_class(tag));
            let doc = self.collection_mut(collection);
            if let Some(existing) = doc.items.get_mut(item) {
                if !existing.iter().any(|t| t == tag) {
                    existing.push(tag.to_string());
                }
            }
        }
    }
}

/// Class metadata inferred from a bare tag name.
pub fn default_class(tag: &str) -> TagClass {
    if is_priority_tag(tag) {
        if let Some(key) = priority_text(tag).and_then(PriorityKey::try_parse) {
            let mut class = TagClass::for_priority(&key);
            class.name = tag.to_string();
            return class;
        }
    }
    if is_stage_tag(tag) {
        if let Some(stage) = stage_from_tag(tag) {
            return TagClass::for_stage(stage);
        }
    }
    TagClass {
        name: tag.to_string(),
        color: PLAIN_TAG_COLOR.to_string(),
        description: String::new(),
    }
}

fn item_not_found(collection: &str, item: &ItemId) -> StoreError {
    StoreError::ItemNotFound {
        collection: collection.to_string(),
        item: item.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_requires_existing_item_and_class() {
        let mut doc = StoreDocument::default();
        let item = ItemId::from("1");
        assert!(matches!(
            doc.add_tag("repo", &item, "status-plan"),
            Err(StoreError::ItemNotFound { .. })
        ));

        doc.create_item("repo", &item);
        assert!(matches!(
            doc.add_tag("repo", &item, "status-plan"),
            Err(StoreError::UnknownTagClass { .. })
        ));

        doc.ensure_class("repo", &default_class("status-plan"));
        assert!(doc.add_tag("repo", &item, "status-plan").expect("add"));
        assert!(!doc.add_tag("repo", &item, "status-plan").expect("re-add"));
        assert_eq!(doc.tags("repo", &item).expect("tags"), vec!["status-plan"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut doc = StoreDocument::default();
        let item = ItemId::from("1");
        doc.seed("repo", &item, &["priority-1", "bug"]);
        assert!(doc.remove_tag("repo", &item, "priority-1").expect("remove"));
        assert!(!doc.remove_tag("repo", &item, "priority-1").expect("remove again"));
        assert_eq!(doc.tags("repo", &item).expect("tags"), vec!["bug"]);
    }

    #[test]
    fn list_filters_by_prefix_and_keeps_untagged_for_empty_prefix() {
        let mut doc = StoreDocument::default();
        doc.seed("repo", &ItemId::from("2"), &["priority-2"]);
        doc.seed("repo", &ItemId::from("10"), &["status-build"]);
        doc.seed("repo", &ItemId::from("3"), &[]);

        let prioritized = doc.list("repo", "priority-");
        assert_eq!(prioritized.len(), 1);
        assert_eq!(prioritized[0].id, ItemId::from("2"));

        let all = doc
            .list("repo", "")
            .into_iter()
            .map(|item| item.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(all, vec!["2", "3", "10"]);
        assert!(doc.list("other", "").is_empty());
    }

    #[test]
    fn ensure_class_keeps_existing_metadata() {
        let mut doc = StoreDocument::default();
        let custom = TagClass {
            name: "status-plan".to_string(),
            color: "000000".to_string(),
            description: "custom".to_string(),
        };
        assert!(doc.ensure_class("repo", &custom));
        assert!(!doc.ensure_class("repo", &default_class("status-plan")));
        let stored = &doc.collection("repo").expect("collection").classes["status-plan"];
        assert_eq!(stored.color, "000000");
    }

    #[test]
    fn document_round_trips_through_json() {
        let mut doc = StoreDocument::default();
        doc.seed("repo", &ItemId::from("5"), &["priority-1.2", "status-learn"]);
        let payload = serde_json::to_string(&doc).expect("serialize");
        let back: StoreDocument = serde_json::from_str(&payload).expect("deserialize");
        assert_eq!(back, doc);
    }
}
