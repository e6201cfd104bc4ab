//! Row model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::column::{CREATED_FIELD, ID_FIELD, ORDER_FIELD, UPDATED_FIELD};

/// Generate a fresh row identifier (`row_<uuid>`).
#[must_use]
pub fn new_row_id() -> String {
    format!("row_{}", Uuid::now_v7().simple())
}

/// A table row: column id to value, plus the `_`-prefixed system fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Row identifier, if the row has one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn created(&self) -> Option<&str> {
        self.0.get(CREATED_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn updated(&self) -> Option<&str> {
        self.0.get(UPDATED_FIELD).and_then(Value::as_str)
    }

    /// Display position, if stored as a non-negative integer.
    #[must_use]
    pub fn order(&self) -> Option<u64> {
        self.0.get(ORDER_FIELD).and_then(Value::as_u64)
    }

    #[must_use]
    pub fn get(&self, column_id: &str) -> Option<&Value> {
        self.0.get(column_id)
    }

    #[must_use]
    pub fn contains(&self, column_id: &str) -> bool {
        self.0.contains_key(column_id)
    }

    pub fn insert(&mut self, column_id: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column_id.into(), value)
    }

    /// Insert only when the key is absent.
    pub fn insert_missing(&mut self, column_id: &str, value: Value) -> bool {
        if self.0.contains_key(column_id) {
            return false;
        }
        self.0.insert(column_id.to_string(), value);
        true
    }

    pub fn remove(&mut self, column_id: &str) -> Option<Value> {
        self.0.shift_remove(column_id)
    }

    pub fn set_order(&mut self, order: usize) {
        self.0.insert(ORDER_FIELD.into(), Value::from(order));
    }

    /// Record a mutation of this row.
    pub fn touch(&mut self, timestamp: &str) {
        self.0
            .insert(UPDATED_FIELD.into(), Value::String(timestamp.to_string()));
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Index of the row with the given id.
#[must_use]
pub fn row_index(rows: &[Row], row_id: &str) -> Option<usize> {
    rows.iter().position(|row| row.id() == Some(row_id))
}

/// Rewrite every row's `_order` to its position.
pub fn restamp_order(rows: &mut [Row]) {
    for (index, row) in rows.iter_mut().enumerate() {
        row.set_order(index);
    }
}

/// Whether `_order` runs 0..n-1 in row position.
#[must_use]
pub fn is_order_dense(rows: &[Row]) -> bool {
    rows.iter()
        .enumerate()
        .all(|(index, row)| row.order() == Some(index as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_ids_unique() {
        let first = new_row_id();
        let second = new_row_id();
        assert_ne!(first, second);
        assert!(first.starts_with("row_"));
    }

    #[test]
    fn test_row_accessors() {
        let row: Row = serde_json::from_value(json!({
            "_id": "row_1",
            "_created": "2024-01-01T00:00:00.000Z",
            "_updated": "2024-01-02T00:00:00.000Z",
            "_order": 4,
            "title": "Buy milk"
        }))
        .unwrap();

        assert_eq!(row.id(), Some("row_1"));
        assert_eq!(row.order(), Some(4));
        assert_eq!(row.created(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(row.get("title"), Some(&json!("Buy milk")));
    }

    #[test]
    fn test_remove_keeps_key_order() {
        let mut row = Row::new();
        row.insert("a", json!(1));
        row.insert("b", json!(2));
        row.insert("c", json!(3));
        row.remove("a");
        let keys = row.fields().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_restamp_order() {
        let mut rows = vec![Row::new(), Row::new(), Row::new()];
        rows[0].set_order(7);
        assert!(!is_order_dense(&rows));
        restamp_order(&mut rows);
        assert!(is_order_dense(&rows));
    }
}
