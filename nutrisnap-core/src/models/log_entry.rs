use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::food_item::FoodItem;

/// A single food entry in the log.
///
/// `id` is assigned by whichever store persists the entry and is absent
/// until then. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub portion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl LogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            portion: String::new(),
            timestamp: None,
        }
    }

    /// Builds an unsaved entry from a classifier result.
    pub fn from_food_item(item: &FoodItem, timestamp: i64) -> Self {
        Self {
            id: None,
            name: item.name.clone(),
            calories: item.calories,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
            portion: item.portion.clone(),
            timestamp: Some(timestamp),
        }
    }

    pub fn with_macros(mut self, calories: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        self.calories = calories;
        self.protein = protein;
        self.carbs = carbs;
        self.fat = fat;
        self
    }

    pub fn with_portion(mut self, portion: impl Into<String>) -> Self {
        self.portion = portion.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns a copy suitable for handing to a store that assigns its own id.
    ///
    /// A missing timestamp is filled in with `now_ms`.
    pub fn to_unsaved(&self, now_ms: i64) -> Self {
        Self {
            id: None,
            timestamp: Some(self.timestamp.unwrap_or(now_ms)),
            ..self.clone()
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.name, self.timestamp)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {} kcal, P:{} C:{} F:{}",
            self.name, self.portion, self.calories, self.protein, self.carbs, self.fat
        )
    }
}

/// De-duplication key for log entries: `name::timestamp`.
///
/// This is an approximation, not a unique key. Two different foods with
/// the same name logged in the same millisecond share a fingerprint and
/// are treated as one entry during migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(name: &str, timestamp: Option<i64>) -> Self {
        let ts = timestamp.map(|t| t.to_string()).unwrap_or_default();
        Self(format!("{}::{}", name, ts))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects the fingerprints of a set of entries.
pub fn fingerprint_set<'a>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
) -> HashSet<Fingerprint> {
    entries.into_iter().map(LogEntry::fingerprint).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let entry = LogEntry::new("Apple").with_timestamp(100);
        assert_eq!(entry.fingerprint().as_str(), "Apple::100");
    }

    #[test]
    fn test_fingerprint_without_timestamp() {
        let entry = LogEntry::new("Apple");
        assert_eq!(entry.fingerprint().as_str(), "Apple::");
    }

    #[test]
    fn test_fingerprint_ignores_id_and_macros() {
        let a = LogEntry::new("Rice").with_timestamp(5).with_id("x");
        let b = LogEntry::new("Rice")
            .with_timestamp(5)
            .with_macros(200.0, 4.0, 44.0, 0.5);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_to_unsaved_strips_id_and_fills_timestamp() {
        let entry = LogEntry::new("Egg").with_id("local-1");
        let unsaved = entry.to_unsaved(42);
        assert!(unsaved.id.is_none());
        assert_eq!(unsaved.timestamp, Some(42));

        let stamped = LogEntry::new("Egg").with_timestamp(7).to_unsaved(42);
        assert_eq!(stamped.timestamp, Some(7));
    }

    #[test]
    fn test_json_uses_camel_case_and_omits_missing_id() {
        let entry = LogEntry::new("Toast")
            .with_macros(80.0, 3.0, 15.0, 1.0)
            .with_portion("1 slice")
            .with_timestamp(1_700_000_000_000);
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["portion"], "1 slice");
    }

    #[test]
    fn test_json_tolerates_missing_fields() {
        let parsed: LogEntry = serde_json::from_str(r#"{"name":"Tea"}"#).unwrap();
        assert_eq!(parsed.name, "Tea");
        assert_eq!(parsed.calories, 0.0);
        assert!(parsed.timestamp.is_none());
    }

    #[test]
    fn test_fingerprint_set() {
        let entries = vec![
            LogEntry::new("Apple").with_timestamp(100),
            LogEntry::new("Apple").with_timestamp(100),
            LogEntry::new("Banana").with_timestamp(200),
        ];
        let set = fingerprint_set(&entries);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Fingerprint::new("Banana", Some(200))));
    }
}
