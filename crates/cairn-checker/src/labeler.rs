//! Key-range labels attached to regions.
//!
//! Label rules tag key ranges (for example a table's data range) with
//! key/value labels. A region straddling a labelled range boundary is split
//! at that boundary so every region carries a single consistent label set.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use cairn_types::RegionInfo;
use serde::{Deserialize, Serialize};

use crate::error::{CheckerError, Result};
use crate::keys;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionLabel {
    pub key: String,
    pub value: String,
}

impl RegionLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// `[start_key, end_key)`; an empty end key means +infinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start_key: Bytes,
    pub end_key: Bytes,
}

impl KeyRange {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start_key: start.into(),
            end_key: end.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub id: String,
    pub labels: Vec<RegionLabel>,
    pub ranges: Vec<KeyRange>,
}

/// Holds label rules, keyed by rule ID.
#[derive(Debug, Default)]
pub struct RegionLabeler {
    rules: RwLock<BTreeMap<String, LabelRule>>,
}

impl RegionLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a label rule.
    pub fn set_label_rule(&self, rule: LabelRule) -> Result<()> {
        if rule.id.is_empty() {
            return Err(CheckerError::InvalidRule(
                "label rule id must not be empty".to_string(),
            ));
        }
        if rule.ranges.is_empty() {
            return Err(CheckerError::InvalidRule(format!(
                "label rule {} has no key ranges",
                rule.id
            )));
        }
        if let Some(range) = rule
            .ranges
            .iter()
            .find(|r| !r.end_key.is_empty() && r.start_key >= r.end_key)
        {
            return Err(CheckerError::InvalidRule(format!(
                "label rule {} has an empty range starting at {:?}",
                rule.id, range.start_key
            )));
        }
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn delete_label_rule(&self, id: &str) -> bool {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn get_label_rule(&self, id: &str) -> Option<LabelRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Labels of every rule with a range that fully covers the region.
    pub fn get_region_labels(&self, region: &RegionInfo) -> Vec<RegionLabel> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules
            .values()
            .filter(|rule| {
                rule.ranges.iter().any(|range| {
                    keys::range_covers(
                        &range.start_key,
                        &range.end_key,
                        region.start_key(),
                        region.end_key(),
                    )
                })
            })
            .flat_map(|rule| rule.labels.iter().cloned())
            .collect()
    }

    /// Range boundaries strictly inside `[start, end)`, sorted and unique.
    pub fn get_split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Bytes> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let mut split_keys: Vec<Bytes> = rules
            .values()
            .flat_map(|rule| rule.ranges.iter())
            .flat_map(|range| [&range.start_key, &range.end_key])
            .filter(|key| keys::is_strictly_inside(key, start, end))
            .cloned()
            .collect();
        split_keys.sort();
        split_keys.dedup();
        split_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::RegionId;

    fn table_rule(id: &str, start: &'static str, end: &'static str) -> LabelRule {
        LabelRule {
            id: id.to_string(),
            labels: vec![RegionLabel::new("table", id)],
            ranges: vec![KeyRange::new(start, end)],
        }
    }

    #[test]
    fn split_keys_inside_region() {
        let labeler = RegionLabeler::new();
        labeler.set_label_rule(table_rule("t1", "c", "f")).unwrap();
        labeler.set_label_rule(table_rule("t2", "f", "k")).unwrap();

        assert_eq!(
            labeler.get_split_keys(b"a", b"z"),
            vec![
                Bytes::from_static(b"c"),
                Bytes::from_static(b"f"),
                Bytes::from_static(b"k")
            ]
        );
        assert!(labeler.get_split_keys(b"c", b"f").is_empty());
    }

    #[test]
    fn region_labels_require_full_coverage() {
        let labeler = RegionLabeler::new();
        labeler.set_label_rule(table_rule("t1", "c", "f")).unwrap();

        let inside = RegionInfo::new(RegionId::new(1), "d", "e", vec![]);
        let outside = RegionInfo::new(RegionId::new(2), "a", "e", vec![]);

        assert_eq!(
            labeler.get_region_labels(&inside),
            vec![RegionLabel::new("table", "t1")]
        );
        assert!(labeler.get_region_labels(&outside).is_empty());
    }

    #[test]
    fn rules_without_ranges_are_rejected() {
        let labeler = RegionLabeler::new();
        let rule = LabelRule {
            id: "empty".to_string(),
            labels: vec![],
            ranges: vec![],
        };
        assert!(matches!(
            labeler.set_label_rule(rule),
            Err(CheckerError::InvalidRule(_))
        ));
        assert!(labeler.set_label_rule(table_rule("bad", "k", "c")).is_err());
    }

    #[test]
    fn delete_label_rule() {
        let labeler = RegionLabeler::new();
        labeler.set_label_rule(table_rule("t1", "c", "f")).unwrap();

        assert!(labeler.get_label_rule("t1").is_some());
        assert!(labeler.delete_label_rule("t1"));
        assert!(!labeler.delete_label_rule("t1"));
        assert!(labeler.get_split_keys(b"", b"").is_empty());
    }
}
