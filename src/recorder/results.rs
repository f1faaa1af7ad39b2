// --- File: src/recorder/results.rs ---

//! Flat, insertion-ordered result mapping produced by a finalize.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Formatted result key → value, in the order keys were produced.
#[derive(Debug, Clone, Default)]
pub struct MetricResults {
    entries: Vec<(String, f64)>,
    /// Position of each key in `entries`
    index: HashMap<String, usize>,
}

impl MetricResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `key`, replacing the value in place if it already exists.
    pub fn insert(&mut self, key: &str, value: f64) {
        match self.index.get(key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&pos| self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

impl PartialEq for MetricResults {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Serialize for MetricResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for MetricResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}: {:.4}", k, v))
            .collect();
        f.write_str(&parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut results = MetricResults::new();
        results.insert("loss", 1.0);
        results.insert("accuracy_A", 0.5);
        results.insert("loss", 0.25);

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["loss", "accuracy_A"]);
        assert_eq!(results.get("loss"), Some(0.25));
        assert_eq!(results.len(), 2);

        results.clear();
        assert_eq!(results.get("loss"), None);
        results.insert("f1_T", 0.5);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["f1_T"]);
    }

    #[test]
    fn test_many_keys_keep_order_and_lookup() {
        let mut results = MetricResults::new();
        for group in 0..50 {
            for metric in ["accuracy", "f1", "mae"] {
                results.insert(&format!("{}_G{}", metric, group), group as f64);
            }
        }
        assert_eq!(results.len(), 150);
        assert_eq!(results.keys().nth(4), Some("f1_G1"));
        assert_eq!(results.get("mae_G49"), Some(49.0));
        assert_eq!(results.get("mae_G50"), None);
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let mut results = MetricResults::new();
        results.insert("loss", 0.5);
        results.insert("f1_T", 0.75);
        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"loss":0.5,"f1_T":0.75}"#);
        assert_eq!(results.to_string(), "loss: 0.5000 | f1_T: 0.7500");
    }
}
