use crate::key::PriorityKey;
use crate::{ItemId, WorkflowStage};
use serde::{Deserialize, Serialize};

pub const PRIORITY_PREFIX: &str = "priority-";
pub const STATUS_PREFIX: &str = "status-";

const DEPTH_COLORS: [&str; 9] = [
    "1f77b4", "2ca02c", "d62728", "ff7f0e", "9467bd", "8c564b", "e377c2", "7f7f7f", "bcbd22",
];

pub fn priority_tag(key: &PriorityKey) -> String {
    format!("{PRIORITY_PREFIX}{key}")
}

pub fn stage_tag(stage: WorkflowStage) -> String {
    format!("{STATUS_PREFIX}{stage}")
}

pub fn is_priority_tag(tag: &str) -> bool {
    tag.starts_with(PRIORITY_PREFIX)
}

pub fn is_stage_tag(tag: &str) -> bool {
    tag.starts_with(STATUS_PREFIX)
}

pub fn priority_text(tag: &str) -> Option<&str> {
    tag.strip_prefix(PRIORITY_PREFIX)
}

pub fn stage_from_tag(tag: &str) -> Option<WorkflowStage> {
    tag.strip_prefix(STATUS_PREFIX)?.parse().ok()
}

/// Metadata for a tag class. Stores that model labels as first-class objects
/// create the class from this before the tag can be attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagClass {
    pub name: String,
    pub color: String,
    pub description: String,
}

impl TagClass {
    pub fn for_priority(key: &PriorityKey) -> Self {
        Self {
            name: priority_tag(key),
            color: DEPTH_COLORS[key.depth() % DEPTH_COLORS.len()].to_string(),
            description: format!("Tree priority {key}"),
        }
    }

    pub fn for_stage(stage: WorkflowStage) -> Self {
        let color = match stage {
            WorkflowStage::Backlog => "0366d6",
            WorkflowStage::Plan => "0e8a16",
            WorkflowStage::Build => "fbca04",
            WorkflowStage::Measure => "d73a49",
            WorkflowStage::Learn => "6f42c1",
            WorkflowStage::Blocked => "e99695",
            WorkflowStage::Archived => "586069",
        };
        Self {
            name: stage_tag(stage),
            color: color.to_string(),
            description: format!("BML status: {stage}"),
        }
    }
}

/// An item as returned by a store listing: its id and raw tag names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedItem {
    pub id: ItemId,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaggedItem {
    pub fn new(id: impl Into<ItemId>, tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            tags,
        }
    }

    pub fn priority_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|tag| is_priority_tag(tag))
    }

    pub fn stage_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|tag| is_stage_tag(tag))
    }

    /// Current key. Numeric keys win over legacy `high/medium/low` labels;
    /// otherwise the first parseable priority tag in store order is used.
    pub fn priority_key(&self) -> Option<PriorityKey> {
        let mut legacy = None;
        for text in self.priority_tags().filter_map(priority_text) {
            if PriorityKey::is_legacy_alias(text) {
                if legacy.is_none() {
                    legacy = PriorityKey::from_legacy_alias(text);
                }
                continue;
            }
            if let Some(key) = PriorityKey::try_parse(text) {
                return Some(key);
            }
        }
        legacy
    }

    pub fn has_priority_tag(&self) -> bool {
        self.priority_tags().next().is_some()
    }

    /// Current stage; duplicates are tolerated and the first valid stage tag
    /// wins.
    pub fn explicit_stage(&self) -> Option<WorkflowStage> {
        self.stage_tags().find_map(stage_from_tag)
    }

    /// Stage with the workflow default applied to untagged items.
    pub fn stage(&self) -> WorkflowStage {
        self.explicit_stage().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tags: &[&str]) -> TaggedItem {
        TaggedItem::new("7", tags.iter().map(|tag| tag.to_string()).collect())
    }

    #[test]
    fn tag_names_follow_the_persisted_layout() {
        let key: PriorityKey = "1.2.3".parse().expect("key");
        assert_eq!(priority_tag(&key), "priority-1.2.3");
        assert_eq!(stage_tag(WorkflowStage::Build), "status-build");
        assert_eq!(priority_text("priority-4.1"), Some("4.1"));
        assert_eq!(stage_from_tag("status-learn"), Some(WorkflowStage::Learn));
        assert_eq!(stage_from_tag("status-unknown"), None);
        assert_eq!(stage_from_tag("priority-1"), None);
    }

    #[test]
    fn numeric_priority_beats_legacy_label() {
        let tagged = item(&["priority-high", "bug", "priority-4.2"]);
        assert_eq!(tagged.priority_key(), Some("4.2".parse().expect("key")));

        let legacy_only = item(&["priority-low"]);
        assert_eq!(legacy_only.priority_key(), Some("3".parse().expect("key")));
    }

    #[test]
    fn unparseable_priority_tags_are_ignored() {
        let tagged = item(&["priority-someday"]);
        assert!(tagged.has_priority_tag());
        assert_eq!(tagged.priority_key(), None);
        assert_eq!(item(&["bug"]).priority_key(), None);
    }

    #[test]
    fn stage_defaults_to_backlog_and_tolerates_duplicates() {
        assert_eq!(item(&[]).stage(), WorkflowStage::Backlog);
        assert_eq!(item(&[]).explicit_stage(), None);
        let dup = item(&["status-bogus", "status-plan", "status-build"]);
        assert_eq!(dup.stage(), WorkflowStage::Plan);
        assert_eq!(dup.stage_tags().count(), 3);
    }

    #[test]
    fn tag_class_metadata() {
        let deep: PriorityKey = "1.1.1.1.1.1.1.1.1.1".parse().expect("key");
        assert_eq!(TagClass::for_priority(&deep).color, "1f77b4");
        let child: PriorityKey = "2.1".parse().expect("key");
        let class = TagClass::for_priority(&child);
        assert_eq!(class.name, "priority-2.1");
        assert_eq!(class.color, "2ca02c");
        assert_eq!(class.description, "Tree priority 2.1");

        let stage = TagClass::for_stage(WorkflowStage::Blocked);
        assert_eq!(stage.name, "status-blocked");
        assert_eq!(stage.color, "e99695");
        assert_eq!(stage.description, "BML status: blocked");
    }
}
