//! Detection class taxonomy.
//!
//! Compatibility groups and the non-vehicle class list belong in data, not
//! code: they are loaded at startup and threaded into the matchers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Configurable class sets used across classification and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTaxonomy {
    /// Vehicle classes the detector commonly confuses at distance; classes in
    /// the same group are treated as compatible rather than conflicting.
    pub compatible_groups: Vec<HashSet<String>>,
    /// Classes dropped by the tracker layer. "person" is kept separately for
    /// pre-screen statistics.
    pub non_vehicle_classes: HashSet<String>,
    /// Raw model class name -> display name
    pub display_names: HashMap<String, String>,
}

impl Default for ClassTaxonomy {
    fn default() -> Self {
        let compatible_groups: Vec<&[&str]> = vec![
            &["ATV", "UTV", "pickup truck", "SUV"],
            &["sedan", "SUV", "car"],
            &["box truck", "delivery truck", "truck"],
        ];
        let compatible_groups = compatible_groups
            .into_iter()
        .map(|g| g.iter().map(|s| String::from(*s)).collect())
        .collect();

        let non_vehicle_classes = ["bird", "cat", "dog", "deer", "bicycle", "bear"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            compatible_groups,
            non_vehicle_classes,
            display_names: HashMap::new(),
        }
    }
}

impl ClassTaxonomy {
    /// Load from a JSON file. Used at startup for site-specific taxonomies.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Display name for a raw model class.
    pub fn display_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.display_names.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// Whether the tracker should drop this class. "person" survives the
    /// filter for pre-screen statistics.
    pub fn is_tracked_class(&self, class_name: &str) -> bool {
        class_name == "person" || !self.non_vehicle_classes.contains(class_name)
    }

    /// Check if two vehicle classes are in the same compatibility group.
    ///
    /// Returns `Some(true)` when equal or grouped together, `Some(false)`
    /// when both known and conflicting, `None` when either side is missing.
    pub fn are_compatible(&self, cls_a: Option<&str>, cls_b: Option<&str>) -> Option<bool> {
        let a = cls_a?;
        let b = cls_b?;
        if a == b {
            return Some(true);
        }
        for group in &self.compatible_groups {
            if group.contains(a) && group.contains(b) {
                return Some(true);
            }
        }
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatible_within_group() {
        let tax = ClassTaxonomy::default();
        assert_eq!(tax.are_compatible(Some("ATV"), Some("pickup truck")), Some(true));
        assert_eq!(tax.are_compatible(Some("sedan"), Some("car")), Some(true));
        assert_eq!(tax.are_compatible(Some("box truck"), Some("truck")), Some(true));
    }

    #[test]
    fn test_conflict_across_groups() {
        let tax = ClassTaxonomy::default();
        assert_eq!(tax.are_compatible(Some("sedan"), Some("box truck")), Some(false));
    }

    #[test]
    fn test_unknown_side_is_none() {
        let tax = ClassTaxonomy::default();
        assert_eq!(tax.are_compatible(None, Some("sedan")), None);
        assert_eq!(tax.are_compatible(Some("sedan"), None), None);
    }

    #[test]
    fn test_person_survives_class_filter() {
        let tax = ClassTaxonomy::default();
        assert!(tax.is_tracked_class("person"));
        assert!(tax.is_tracked_class("pickup truck"));
        assert!(!tax.is_tracked_class("bird"));
    }

    #[test]
    fn test_from_json_roundtrip() {
        let tax = ClassTaxonomy::default();
        let json = serde_json::to_string(&tax).unwrap();
        let parsed = ClassTaxonomy::from_json(&json).unwrap();
        assert_eq!(parsed.compatible_groups.len(), tax.compatible_groups.len());
    }
}
