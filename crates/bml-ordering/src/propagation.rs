use crate::engine::OrderingEngine;
use crate::OrderingError;
use bml_core::{ItemId, PriorityKey, TagStore, TaggedItem, WorkflowStage, PRIORITY_PREFIX};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PropagationOutcome {
    Inherited {
        item: ItemId,
        parent: ItemId,
        stage: WorkflowStage,
    },
    /// The key is a root key.
    NoParent,
    /// No item currently holds the parent key.
    ParentMissing { parent_key: PriorityKey },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub examined: usize,
    pub inherited: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct IndexEntry {
    id: ItemId,
    key: PriorityKey,
    stage: WorkflowStage,
    stage_tags: usize,
}

impl<S: TagStore> OrderingEngine<S> {
    /// Copies the stage of the item holding `key`'s parent onto `item`.
    pub async fn propagate_from_parent(
        &self,
        collection: &str,
        item: &ItemId,
        key: &PriorityKey,
    ) -> Result<PropagationOutcome, OrderingError> {
        let Some(parent_key) = key.parent() else {
            return Ok(PropagationOutcome::NoParent);
        };
        let candidates = self
            .timed(self.store().list_tagged_items(collection, PRIORITY_PREFIX))
            .await?;
        let Some(parent) = candidates.into_iter().find(|candidate| {
            &candidate.id != item && candidate.priority_key().as_ref() == Some(&parent_key)
        }) else {
            debug!(
                event = "parent_missing",
                collection,
                item = %item,
                parent_key = %parent_key
            );
            return Ok(PropagationOutcome::ParentMissing { parent_key });
        };

        let stage = parent.stage();
        self.set_stage(collection, item, stage).await?;
        Ok(PropagationOutcome::Inherited {
            item: item.clone(),
            parent: parent.id,
            stage,
        })
    }

    /// Propagates from the item's own current key.
    pub async fn propagate_item(
        &self,
        collection: &str,
        item: &ItemId,
    ) -> Result<PropagationOutcome, OrderingError> {
        let tags = self.timed(self.store().get_tags(collection, item)).await?;
        let Some(key) = TaggedItem::new(item.clone(), tags).priority_key() else {
            return Err(OrderingError::NoPriority(item.clone()));
        };
        self.propagate_from_parent(collection, item, &key).await
    }

    /// Pushes stages down the subtree rooted at `root`, parents first.
    ///
    /// The collection is listed once. Stages written during the run update
    /// the in-memory index, so grandchildren see their parent's new stage.
    /// Per-item failures are counted and the walk continues.
    pub async fn sync_subtree(
        &self,
        collection: &str,
        root: &PriorityKey,
    ) -> Result<SyncReport, OrderingError> {
        let listed = self
            .timed(self.store().list_tagged_items(collection, PRIORITY_PREFIX))
            .await?;
        let mut index = listed
            .into_iter()
            .filter_map(|item| {
                let key = item.priority_key()?;
                Some(IndexEntry {
                    stage: item.stage(),
                    stage_tags: item.stage_tags().count(),
                    id: item.id,
                    key,
                })
            })
            .collect::<Vec<_>>();

        let mut members = index
            .iter()
            .enumerate()
            .filter(|(_, entry)| root.contains(&entry.key))
            .map(|(pos, _)| pos)
            .collect::<Vec<_>>();
        members.sort_by(|left, right| {
            let (left, right) = (&index[*left], &index[*right]);
            left.key
                .depth()
                .cmp(&right.key.depth())
                .then_with(|| left.key.cmp(&right.key))
        });

        let mut report = SyncReport::default();
        for member in members {
            report.examined += 1;
            let Some(parent_key) = index[member].key.parent() else {
                report.skipped += 1;
                continue;
            };
            let holder = index
                .iter()
                .position(|entry| entry.key == parent_key && entry.id != index[member].id);
            let Some(holder) = holder else {
                report.skipped += 1;
                debug!(
                    event = "sync_parent_missing",
                    collection,
                    item = %index[member].id,
                    parent_key = %parent_key
                );
                continue;
            };

            let stage = index[holder].stage;
            if index[member].stage == stage && index[member].stage_tags <= 1 {
                report.unchanged += 1;
                continue;
            }

            let item = index[member].id.clone();
            match self.set_stage(collection, &item, stage).await {
                Ok(outcome) => {
                    report.inherited += 1;
                    index[member].stage = stage;
                    index[member].stage_tags = 1 + outcome.cleanup_failed;
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        event = "sync_stage_failed",
                        collection,
                        item = %item,
                        stage = %stage,
                        error = %err
                    );
                }
            }
        }

        info!(
            event = "subtree_synced",
            collection,
            root = %root,
            examined = report.examined,
            inherited = report.inherited,
            skipped = report.skipped,
            failed = report.failed
        );
        Ok(report)
    }
}
