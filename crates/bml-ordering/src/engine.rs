use crate::{EngineConfig, OrderingError};
use bml_core::tags::{is_priority_tag, is_stage_tag, priority_tag, stage_tag};
use bml_core::{
    ItemId, PriorityKey, StoreError, TagClass, TagStore, TaggedItem, WorkflowStage,
    PRIORITY_PREFIX,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, info, warn};

/// One row of the ordered backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrioritizedItem {
    pub id: ItemId,
    pub key: Option<PriorityKey>,
    pub stage: WorkflowStage,
    pub tags: Vec<String>,
}

impl PrioritizedItem {
    fn from_tagged(item: TaggedItem) -> Self {
        Self {
            key: item.priority_key(),
            stage: item.stage(),
            id: item.id,
            tags: item.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub item: ItemId,
    pub stage: WorkflowStage,
    pub previous: Option<WorkflowStage>,
    pub stale_removed: usize,
    pub cleanup_failed: usize,
}

pub struct OrderingEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: TagStore> OrderingEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bounds a single store call by `call_timeout`.
    pub(crate) async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.call_timeout)),
        }
    }

    /// Items with a readable key, ascending. Ties keep store listing order.
    pub(crate) async fn prioritized(
        &self,
        collection: &str,
    ) -> Result<Vec<(ItemId, PriorityKey)>, StoreError> {
        let listed = self
            .timed(self.store.list_tagged_items(collection, PRIORITY_PREFIX))
            .await?;
        let mut ordered = listed
            .into_iter()
            .filter_map(|item| {
                let key = item.priority_key()?;
                Some((item.id, key))
            })
            .collect::<Vec<_>>();
        ordered.sort_by(|left, right| left.1.cmp(&right.1));
        Ok(ordered)
    }

    /// Whole collection in backlog order; items without a key follow in
    /// store order.
    pub async fn ordered_items(
        &self,
        collection: &str,
    ) -> Result<Vec<PrioritizedItem>, OrderingError> {
        let listed = self.timed(self.store.list_tagged_items(collection, "")).await?;
        let mut items = listed
            .into_iter()
            .map(PrioritizedItem::from_tagged)
            .collect::<Vec<_>>();
        items.sort_by(|left, right| match (&left.key, &right.key) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(items)
    }

    pub async fn lanes(
        &self,
        collection: &str,
    ) -> Result<BTreeMap<WorkflowStage, Vec<PrioritizedItem>>, OrderingError> {
        let mut lanes: BTreeMap<WorkflowStage, Vec<PrioritizedItem>> = BTreeMap::new();
        for item in self.ordered_items(collection).await? {
            lanes.entry(item.stage).or_default().push(item);
        }
        Ok(lanes)
    }

    pub async fn item(
        &self,
        collection: &str,
        item: &ItemId,
    ) -> Result<PrioritizedItem, OrderingError> {
        let tags = self.timed(self.store.get_tags(collection, item)).await?;
        Ok(PrioritizedItem::from_tagged(TaggedItem::new(item.clone(), tags)))
    }

    /// Replaces the item's priority tag. The new tag is attached before the
    /// old ones are detached, so a reader sees either the old or the new key.
    pub async fn write_priority(
        &self,
        collection: &str,
        item: &ItemId,
        key: &PriorityKey,
    ) -> Result<(), OrderingError> {
        let tag = priority_tag(key);
        self.timed(
            self.store
                .ensure_tag_class(collection, &TagClass::for_priority(key)),
        )
        .await?;
        let current = self.timed(self.store.get_tags(collection, item)).await?;
        if !current.iter().any(|existing| existing == &tag) {
            self.timed(self.store.add_tag(collection, item, &tag)).await?;
        }
        for old in current
            .iter()
            .filter(|existing| is_priority_tag(existing) && **existing != tag)
        {
            self.timed(self.store.remove_tag(collection, item, old)).await?;
        }
        info!(
            event = "priority_written",
            collection,
            item = %item,
            key = %key
        );
        Ok(())
    }

    pub async fn set_priority(
        &self,
        collection: &str,
        item: &ItemId,
        key: &PriorityKey,
    ) -> Result<(), OrderingError> {
        self.write_priority(collection, item, key).await
    }

    /// Writes the key, then copies the parent's stage onto the item.
    pub async fn set_priority_with_inheritance(
        &self,
        collection: &str,
        item: &ItemId,
        key: &PriorityKey,
    ) -> Result<crate::PropagationOutcome, OrderingError> {
        self.write_priority(collection, item, key).await?;
        self.propagate_from_parent(collection, item, key).await
    }

    /// Sets the stage tag and clears any other `status-*` tags. Cleanup is
    /// best-effort: a failed removal is logged and counted.
    pub async fn set_stage(
        &self,
        collection: &str,
        item: &ItemId,
        stage: WorkflowStage,
    ) -> Result<StageOutcome, OrderingError> {
        let tag = stage_tag(stage);
        let current = self.timed(self.store.get_tags(collection, item)).await?;
        let previous = TaggedItem::new(item.clone(), current.clone()).explicit_stage();

        self.timed(
            self.store
                .ensure_tag_class(collection, &TagClass::for_stage(stage)),
        )
        .await?;
        if current.iter().any(|existing| existing == &tag) {
            debug!(event = "stage_tag_present", collection, item = %item, stage = %stage);
        } else {
            self.timed(self.store.add_tag(collection, item, &tag)).await?;
        }

        let mut outcome = StageOutcome {
            item: item.clone(),
            stage,
            previous,
            stale_removed: 0,
            cleanup_failed: 0,
        };
        for stale in current
            .iter()
            .filter(|existing| is_stage_tag(existing) && **existing != tag)
        {
            match self.timed(self.store.remove_tag(collection, item, stale)).await {
                Ok(()) => outcome.stale_removed += 1,
                Err(err) => {
                    outcome.cleanup_failed += 1;
                    warn!(
                        event = "stale_stage_cleanup_failed",
                        collection,
                        item = %item,
                        tag = %stale,
                        error = %err
                    );
                }
            }
        }
        info!(event = "stage_written", collection, item = %item, stage = %stage);
        Ok(outcome)
    }

    /// Moves the item one step along the workflow. Untagged items count as
    /// `backlog`.
    pub async fn advance_stage(
        &self,
        collection: &str,
        item: &ItemId,
    ) -> Result<StageOutcome, OrderingError> {
        let tags = self.timed(self.store.get_tags(collection, item)).await?;
        let current = TaggedItem::new(item.clone(), tags).stage();
        let Some(next) = current.next() else {
            return Err(OrderingError::NoNextStage {
                item: item.clone(),
                stage: current,
            });
        };
        self.set_stage(collection, item, next).await
    }
}
