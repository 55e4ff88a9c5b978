use crate::engine::OrderingEngine;
use crate::OrderingError;
use bml_core::tags::{is_priority_tag, is_stage_tag, priority_tag, stage_tag};
use bml_core::{ItemId, PriorityKey, SlotMap, StoreError, TagClass, TagStore, WorkflowStage};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Lane order used when flattening a slot map, highest priority first.
pub const RECONCILE_ORDER: [WorkflowStage; 7] = [
    WorkflowStage::Learn,
    WorkflowStage::Measure,
    WorkflowStage::Build,
    WorkflowStage::Plan,
    WorkflowStage::Backlog,
    WorkflowStage::Blocked,
    WorkflowStage::Archived,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    pub item: ItemId,
    pub key: PriorityKey,
    pub stage: WorkflowStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ClearTags,
    WritePriorities,
    WriteStages,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ClearTags => "clear_tags",
            Phase::WritePriorities => "write_priorities",
            Phase::WriteStages => "write_stages",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub class_failures: usize,
}

impl PhaseReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    fn is_clean(&self) -> bool {
        self.succeeded == self.attempted && self.class_failures == 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub success: bool,
    pub planned: usize,
    pub items_seen: usize,
    pub updated: usize,
    pub failed_phase: Option<Phase>,
    pub clear_tags: PhaseReport,
    pub write_priorities: PhaseReport,
    pub write_stages: Option<PhaseReport>,
}

impl ReconcileReport {
    pub fn into_result(self) -> Result<Self, OrderingError> {
        let Some(phase) = self.failed_phase else {
            return Ok(self);
        };
        let counts = match phase {
            Phase::ClearTags => self.clear_tags,
            Phase::WritePriorities => self.write_priorities,
            Phase::WriteStages => self.write_stages.unwrap_or_default(),
        };
        Err(OrderingError::PhaseFailure {
            phase,
            attempted: counts.attempted,
            succeeded: counts.succeeded,
        })
    }
}

/// Derives every entry's key and stage from the slot map without touching
/// the store.
///
/// Lanes are flattened in [`RECONCILE_ORDER`]. Root slots take consecutive
/// top-level numbers across all lanes; a child extends its parent's key by
/// its position among the parent's direct children. Entries come back in
/// pre-order, which is also ascending key order.
pub fn plan_slot_map(map: &SlotMap) -> Result<Vec<PlannedEntry>, OrderingError> {
    let mut planned = Vec::with_capacity(map.len());
    let mut seen_items = HashSet::new();
    let mut next_root = 0u64;

    for stage in RECONCILE_ORDER {
        let lane = map.lane(stage);
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); lane.len()];
        let mut roots = Vec::new();

        for (slot, entry) in lane.iter().enumerate() {
            if !seen_items.insert(entry.item.clone()) {
                return Err(OrderingError::InvalidSlotMap(format!(
                    "item #{} appears more than once",
                    entry.item
                )));
            }
            match entry.parent_slot {
                None => roots.push(slot),
                Some(parent) if parent == slot => {
                    return Err(OrderingError::InvalidSlotMap(format!(
                        "{stage} slot {slot} is its own parent"
                    )));
                }
                Some(parent) if parent >= lane.len() => {
                    return Err(OrderingError::InvalidSlotMap(format!(
                        "{stage} slot {slot} points at missing parent slot {parent}"
                    )));
                }
                Some(parent) => children[parent].push(slot),
            }
        }

        let mut reached = 0usize;
        let mut stack: Vec<(usize, PriorityKey)> = Vec::new();
        for root in roots {
            next_root += 1;
            stack.push((root, PriorityKey::root_key(next_root)));
            while let Some((slot, key)) = stack.pop() {
                reached += 1;
                for (idx, child) in children[slot].iter().enumerate().rev() {
                    stack.push((*child, key.child(idx as u64 + 1)));
                }
                planned.push(PlannedEntry {
                    item: lane[slot].item.clone(),
                    key,
                    stage,
                });
            }
        }

        if reached != lane.len() {
            return Err(OrderingError::InvalidSlotMap(format!(
                "{stage} lane has {} slot(s) in a parent cycle",
                lane.len() - reached
            )));
        }
    }

    Ok(planned)
}

impl<S: TagStore> OrderingEngine<S> {
    /// Rewrites every item's priority and stage from `map`.
    ///
    /// Runs three phases with a barrier between them: clear old tags
    /// (best-effort), write priorities, write stages. A failed write in
    /// either write phase stops the run after that phase; nothing is rolled
    /// back. Only an invalid map or a failed listing returns `Err`.
    pub async fn reconcile(
        &self,
        collection: &str,
        map: &SlotMap,
    ) -> Result<ReconcileReport, OrderingError> {
        let planned = plan_slot_map(map)?;
        let listed = self.timed(self.store().list_tagged_items(collection, "")).await?;
        let mut report = ReconcileReport {
            planned: planned.len(),
            items_seen: listed.len(),
            ..ReconcileReport::default()
        };

        let item_ids = listed.into_iter().map(|item| item.id).collect::<Vec<_>>();
        report.clear_tags = self.clear_ordering_tags(collection, &item_ids).await;

        let priority_writes = planned
            .iter()
            .map(|entry| (&entry.item, priority_tag(&entry.key)))
            .collect::<Vec<_>>();
        let priority_classes = planned
            .iter()
            .map(|entry| TagClass::for_priority(&entry.key))
            .collect::<Vec<_>>();
        report.write_priorities = self
            .write_phase(collection, Phase::WritePriorities, priority_classes, priority_writes)
            .await;
        if !report.write_priorities.is_clean() {
            return Ok(self.finish(collection, report, Phase::WritePriorities));
        }

        let stage_writes = planned
            .iter()
            .map(|entry| (&entry.item, stage_tag(entry.stage)))
            .collect::<Vec<_>>();
        let stage_classes = planned
            .iter()
            .map(|entry| TagClass::for_stage(entry.stage))
            .collect::<Vec<_>>();
        let stages = self
            .write_phase(collection, Phase::WriteStages, stage_classes, stage_writes)
            .await;
        let clean = stages.is_clean();
        report.updated = stages.succeeded;
        report.write_stages = Some(stages);
        if !clean {
            return Ok(self.finish(collection, report, Phase::WriteStages));
        }

        report.success = true;
        info!(
            event = "reconcile_completed",
            collection,
            planned = report.planned,
            items_seen = report.items_seen,
            updated = report.updated,
            clear_failures = report.clear_tags.failed()
        );
        Ok(report)
    }

    fn finish(&self, collection: &str, mut report: ReconcileReport, phase: Phase) -> ReconcileReport {
        report.failed_phase = Some(phase);
        warn!(
            event = "reconcile_phase_failed",
            collection,
            phase = %phase,
            planned = report.planned
        );
        report
    }

    async fn clear_ordering_tags(&self, collection: &str, items: &[ItemId]) -> PhaseReport {
        let results = stream::iter(items)
            .map(|item| async move {
                let result = self.clear_item(collection, item).await;
                if let Err(err) = &result {
                    warn!(
                        event = "reconcile_clear_failed",
                        collection,
                        item = %item,
                        error = %err
                    );
                }
                result.is_ok()
            })
            .buffer_unordered(self.config().max_in_flight.max(1))
            .collect::<Vec<_>>()
            .await;
        PhaseReport {
            attempted: results.len(),
            succeeded: results.iter().filter(|ok| **ok).count(),
            class_failures: 0,
        }
    }

    /// Removes every ordering tag of `item`, returning the first error after
    /// all removals were attempted.
    async fn clear_item(&self, collection: &str, item: &ItemId) -> Result<(), StoreError> {
        let tags = self.timed(self.store().get_tags(collection, item)).await?;
        let mut first_error = None;
        for tag in tags
            .iter()
            .filter(|tag| is_priority_tag(tag) || is_stage_tag(tag))
        {
            if let Err(err) = self.timed(self.store().remove_tag(collection, item, tag)).await {
                debug!(
                    event = "reconcile_tag_removal_failed",
                    collection,
                    item = %item,
                    tag = %tag,
                    error = %err
                );
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn write_phase(
        &self,
        collection: &str,
        phase: Phase,
        classes: Vec<TagClass>,
        writes: Vec<(&ItemId, String)>,
    ) -> PhaseReport {
        let distinct = classes
            .into_iter()
            .map(|class| (class.name.clone(), class))
            .collect::<BTreeMap<_, _>>();
        let class_results = stream::iter(distinct.values())
            .map(|class| async move {
                let result = self.timed(self.store().ensure_tag_class(collection, class)).await;
                if let Err(err) = &result {
                    warn!(
                        event = "reconcile_class_failed",
                        collection,
                        phase = %phase,
                        tag = %class.name,
                        error = %err
                    );
                }
                result.is_ok()
            })
            .buffer_unordered(self.config().max_in_flight.max(1))
            .collect::<Vec<_>>()
            .await;

        let write_results = stream::iter(writes.iter())
            .map(|(item, tag)| async move {
                let result = self.timed(self.store().add_tag(collection, item, tag)).await;
                if let Err(err) = &result {
                    warn!(
                        event = "reconcile_write_failed",
                        collection,
                        phase = %phase,
                        item = %item,
                        tag = %tag,
                        error = %err
                    );
                }
                result.is_ok()
            })
            .buffer_unordered(self.config().max_in_flight.max(1))
            .collect::<Vec<_>>()
            .await;

        PhaseReport {
            attempted: write_results.len(),
            succeeded: write_results.iter().filter(|ok| **ok).count(),
            class_failures: class_results.iter().filter(|ok| !**ok).count(),
        }
    }
}
