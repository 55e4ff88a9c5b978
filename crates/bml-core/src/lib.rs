use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub mod allocator;
pub mod key;
pub mod slot_map;
pub mod store;
pub mod tags;

pub use allocator::allocate_insertion_key;
pub use key::{KeyParseError, PriorityKey, SENTINEL_COMPONENT};
pub use slot_map::{SlotEntry, SlotMap};
pub use store::{StoreError, TagStore};
pub use tags::{TagClass, TaggedItem, PRIORITY_PREFIX, STATUS_PREFIX};

/// External item identifier. Numeric ids order numerically and sort ahead of
/// free-form ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().trim_start_matches('#').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(left), Ok(right)) => left.cmp(&right).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for ItemId {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let id = ItemId::new(input);
        if id.0.is_empty() {
            return Err("Item id cannot be empty".to_string());
        }
        Ok(id)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_id(deserializer).map(ItemId::new)
    }
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    match val {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected non-empty string or number for id",
        )),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStage {
    Backlog,
    Plan,
    Build,
    Measure,
    Learn,
    Blocked,
    Archived,
}

impl Default for WorkflowStage {
    fn default() -> Self {
        Self::Backlog
    }
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 7] = [
        WorkflowStage::Backlog,
        WorkflowStage::Plan,
        WorkflowStage::Build,
        WorkflowStage::Measure,
        WorkflowStage::Learn,
        WorkflowStage::Blocked,
        WorkflowStage::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Backlog => "backlog",
            WorkflowStage::Plan => "plan",
            WorkflowStage::Build => "build",
            WorkflowStage::Measure => "measure",
            WorkflowStage::Learn => "learn",
            WorkflowStage::Blocked => "blocked",
            WorkflowStage::Archived => "archived",
        }
    }

    /// Successor along the build-measure-learn loop. `blocked` is a side
    /// state and `archived` is terminal, so neither advances.
    pub fn next(&self) -> Option<WorkflowStage> {
        match self {
            WorkflowStage::Backlog => Some(WorkflowStage::Plan),
            WorkflowStage::Plan => Some(WorkflowStage::Build),
            WorkflowStage::Build => Some(WorkflowStage::Measure),
            WorkflowStage::Measure => Some(WorkflowStage::Learn),
            WorkflowStage::Learn => Some(WorkflowStage::Archived),
            WorkflowStage::Blocked | WorkflowStage::Archived => None,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStage {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "backlog" => Ok(WorkflowStage::Backlog),
            "plan" => Ok(WorkflowStage::Plan),
            "build" => Ok(WorkflowStage::Build),
            "measure" => Ok(WorkflowStage::Measure),
            "learn" => Ok(WorkflowStage::Learn),
            "blocked" => Ok(WorkflowStage::Blocked),
            "archived" => Ok(WorkflowStage::Archived),
            other => Err(format!("Unknown stage: {other}")),
        }
    }
}
