use crate::{ItemId, WorkflowStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    #[serde(rename = "issueId", alias = "itemId")]
    pub item: ItemId,
    /// Index of the parent entry within the same lane.
    #[serde(rename = "parentSlot", default)]
    pub parent_slot: Option<usize>,
}

/// Client-supplied layout of the whole board: per lane, the ordered slots
/// with back-references to parent slots.
///
/// Wire form: `{"plan": [{"issueId": 4, "parentSlot": null}, ...], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotMap {
    lanes: BTreeMap<WorkflowStage, Vec<SlotEntry>>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Appends a slot to `stage` and returns its slot index.
    pub fn push(
        &mut self,
        stage: WorkflowStage,
        item: impl Into<ItemId>,
        parent_slot: Option<usize>,
    ) -> usize {
        let lane = self.lanes.entry(stage).or_default();
        lane.push(SlotEntry {
            item: item.into(),
            parent_slot,
        });
        lane.len() - 1
    }

    pub fn lane(&self, stage: WorkflowStage) -> &[SlotEntry] {
        self.lanes.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.lanes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
