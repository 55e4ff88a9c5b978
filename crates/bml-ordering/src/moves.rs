use crate::engine::OrderingEngine;
use crate::OrderingError;
use bml_core::{allocate_insertion_key, ItemId, PriorityKey, TagStore};
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Placement {
    Above { target: ItemId },
    Below { target: ItemId },
    Between { above: ItemId, below: ItemId },
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Above { target } => write!(f, "above #{target}"),
            Placement::Below { target } => write!(f, "below #{target}"),
            Placement::Between { above, below } => write!(f, "between #{above} and #{below}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub item: ItemId,
    pub placement: Placement,
    /// One-based position in the ordered list after the move.
    pub position: usize,
    pub key: PriorityKey,
}

impl MoveOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Moved item #{} {} | List position: {} | Priority: {}",
            self.item, self.placement, self.position, self.key
        )
    }
}

impl<S: TagStore> OrderingEngine<S> {
    pub async fn move_above(
        &self,
        collection: &str,
        item: &ItemId,
        target: &ItemId,
    ) -> Result<MoveOutcome, OrderingError> {
        self.relocate(
            collection,
            item,
            Placement::Above {
                target: target.clone(),
            },
        )
        .await
    }

    pub async fn move_below(
        &self,
        collection: &str,
        item: &ItemId,
        target: &ItemId,
    ) -> Result<MoveOutcome, OrderingError> {
        self.relocate(
            collection,
            item,
            Placement::Below {
                target: target.clone(),
            },
        )
        .await
    }

    pub async fn move_between(
        &self,
        collection: &str,
        item: &ItemId,
        above: &ItemId,
        below: &ItemId,
    ) -> Result<MoveOutcome, OrderingError> {
        self.relocate(
            collection,
            item,
            Placement::Between {
                above: above.clone(),
                below: below.clone(),
            },
        )
        .await
    }

    async fn relocate(
        &self,
        collection: &str,
        item: &ItemId,
        placement: Placement,
    ) -> Result<MoveOutcome, OrderingError> {
        let mut ordered = self.prioritized(collection).await?;
        let Some(current) = ordered.iter().position(|(id, _)| id == item) else {
            return Err(OrderingError::NoPriority(item.clone()));
        };
        ordered.remove(current);

        let locate = |role: &'static str, wanted: &ItemId| {
            ordered
                .iter()
                .position(|(id, _)| id == wanted)
                .ok_or_else(|| OrderingError::NotFound {
                    role,
                    item: wanted.clone(),
                })
        };

        let position = match &placement {
            Placement::Above { target } => locate("target", target)?,
            Placement::Below { target } => locate("target", target)? + 1,
            Placement::Between { above, below } => {
                let above_idx = locate("above", above)?;
                let below_idx = locate("below", below)?;
                if above_idx >= below_idx {
                    return Err(OrderingError::InvalidOrdering {
                        above: above.clone(),
                        below: below.clone(),
                    });
                }
                above_idx + 1
            }
        };

        let key = allocate_insertion_key(&ordered, position);
        self.write_priority(collection, item, &key).await?;

        let outcome = MoveOutcome {
            item: item.clone(),
            placement,
            position: position + 1,
            key,
        };
        info!(
            event = "item_moved",
            collection,
            item = %outcome.item,
            placement = %outcome.placement,
            position = outcome.position,
            key = %outcome.key
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use bml_storage::MemoryTagStore;

    async fn seeded(keys: &[(u64, &str)]) -> OrderingEngine<MemoryTagStore> {
        let store = MemoryTagStore::new();
        for (id, key) in keys {
            let tag = format!("priority-{key}");
            store.seed("repo", *id, &[tag.as_str()]).expect("seed");
        }
        OrderingEngine::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn move_above_takes_the_gap_below_the_first_root() {
        let engine = seeded(&[(1, "3"), (2, "4"), (3, "5")]).await;
        let outcome = engine
            .move_above("repo", &ItemId::from(3u64), &ItemId::from(1u64))
            .await
            .expect("move");
        assert_eq!(outcome.position, 1);
        assert_eq!(outcome.key.to_string(), "2");
        assert_eq!(
            outcome.summary(),
            "Moved item #3 above #1 | List position: 1 | Priority: 2"
        );
    }

    #[tokio::test]
    async fn move_between_rejects_reversed_neighbours() {
        let engine = seeded(&[(1, "1"), (2, "2"), (3, "3")]).await;
        let err = engine
            .move_between(
                "repo",
                &ItemId::from(1u64),
                &ItemId::from(3u64),
                &ItemId::from(2u64),
            )
            .await
            .expect_err("reversed");
        assert!(matches!(err, OrderingError::InvalidOrdering { .. }));

        let tags = engine
            .store()
            .get_tags("repo", &ItemId::from(1u64))
            .await
            .expect("tags");
        assert_eq!(tags, vec!["priority-1"]);
    }

    #[tokio::test]
    async fn missing_items_are_reported_by_role() {
        let engine = seeded(&[(1, "1"), (2, "2")]).await;
        let err = engine
            .move_below("repo", &ItemId::from(9u64), &ItemId::from(1u64))
            .await
            .expect_err("no priority");
        assert!(matches!(err, OrderingError::NoPriority(_)));

        let err = engine
            .move_between(
                "repo",
                &ItemId::from(1u64),
                &ItemId::from(2u64),
                &ItemId::from(7u64),
            )
            .await
            .expect_err("missing below");
        assert!(matches!(err, OrderingError::NotFound { role: "below", .. }));
    }

    #[tokio::test]
    async fn move_between_siblings_increments_the_last_component() {
        let engine = seeded(&[(1, "1.1.1"), (2, "1.1.3"), (3, "2")]).await;
        let outcome = engine
            .move_between(
                "repo",
                &ItemId::from(3u64),
                &ItemId::from(1u64),
                &ItemId::from(2u64),
            )
            .await
            .expect("move");
        assert_eq!(outcome.key.to_string(), "1.1.2");
        assert_eq!(outcome.position, 2);
        assert_eq!(
            outcome.summary(),
            "Moved item #3 between #1 and #2 | List position: 2 | Priority: 1.1.2"
        );
    }
}
