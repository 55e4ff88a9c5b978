use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Root component given to keys that cannot be parsed.
///
/// The sentinel is an ordinary key value: it sorts after every root below
/// `999`, a stored `999` is indistinguishable from it, and roots from `1000`
/// up sort after it. Callers that must tell a parse failure apart use
/// [`PriorityKey::try_parse`].
pub const SENTINEL_COMPONENT: u64 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid priority key: {0:?}")]
pub struct KeyParseError(pub String);

/// Position in an ordered forest, written as dotted integers (`1.2.3`).
///
/// Ordering is component-wise and numeric. A key that is a strict prefix of
/// another is its ancestor and sorts immediately before all of its
/// descendants: `1 < 1.1 < 1.1.9 < 1.2 < 1.10 < 2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorityKey {
    // Non-empty. Vec's lexicographic Ord already puts prefixes first.
    parts: Vec<u64>,
}

impl PriorityKey {
    pub fn new(parts: Vec<u64>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self { parts })
    }

    pub fn root_key(component: u64) -> Self {
        Self {
            parts: vec![component],
        }
    }

    pub fn sentinel() -> Self {
        Self::root_key(SENTINEL_COMPONENT)
    }

    /// Lenient parse used when reading tags: never fails, unreadable text
    /// becomes the sentinel key.
    pub fn parse(text: &str) -> Self {
        Self::try_parse(text).unwrap_or_else(Self::sentinel)
    }

    pub fn try_parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(legacy) = Self::from_legacy_alias(text) {
            return Some(legacy);
        }
        if text.is_empty() {
            return None;
        }
        let parts = text
            .split('.')
            .map(|part| part.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        Self::new(parts)
    }

    pub fn from_legacy_alias(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "high" => Some(Self::root_key(1)),
            "medium" => Some(Self::root_key(2)),
            "low" => Some(Self::root_key(3)),
            _ => None,
        }
    }

    pub fn is_legacy_alias(text: &str) -> bool {
        Self::from_legacy_alias(text).is_some()
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    pub fn root(&self) -> u64 {
        self.parts[0]
    }

    pub fn last(&self) -> u64 {
        self.parts[self.parts.len() - 1]
    }

    pub fn component(&self, index: usize) -> Option<u64> {
        self.parts.get(index).copied()
    }

    pub fn depth(&self) -> usize {
        self.parts.len() - 1
    }

    /// True for `[999]`, whether it came from a parse failure or was stored.
    pub fn is_sentinel(&self) -> bool {
        self.parts == [SENTINEL_COMPONENT]
    }

    pub fn parent(&self) -> Option<PriorityKey> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, component: u64) -> PriorityKey {
        let mut parts = self.parts.clone();
        parts.push(component);
        Self { parts }
    }

    pub fn with_last_incremented(&self) -> PriorityKey {
        let mut parts = self.parts.clone();
        let last = parts.len() - 1;
        parts[last] = parts[last].saturating_add(1);
        Self { parts }
    }

    /// Strict ancestor test, component-wise (`1` is not an ancestor of `10`).
    pub fn is_ancestor_of(&self, other: &PriorityKey) -> bool {
        self.parts.len() < other.parts.len() && other.parts.starts_with(&self.parts)
    }

    /// True for this key itself and every descendant of it.
    pub fn contains(&self, other: &PriorityKey) -> bool {
        other.parts.starts_with(&self.parts)
    }
}

impl fmt::Display for PriorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for PriorityKey {
    type Err = KeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::try_parse(input).ok_or_else(|| KeyParseError(input.to_string()))
    }
}

impl Serialize for PriorityKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PriorityKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
