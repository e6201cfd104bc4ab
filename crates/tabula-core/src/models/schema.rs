//! Table schema model

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::column::{
    ColumnDefinition, ColumnType, CREATED_FIELD, ID_FIELD, ORDER_FIELD, UPDATED_FIELD,
};

const SCHEMA_VERSION: &str = "1.0";

/// Ordered column set plus opaque bags passed through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Table display name
    #[serde(default, rename = "table_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Columns in display order
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    /// Unknown top-level keys, kept for round-tripping
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TableSchema {
    /// Schema written for a freshly created table.
    #[must_use]
    pub fn initial(table_name: &str, timestamp: &str) -> Self {
        let mut id_column = ColumnDefinition::system(ID_FIELD, "ID", ColumnType::Text);
        id_column.required = true;

        let mut metadata = Map::new();
        metadata.insert("created_at".into(), json!(timestamp));
        metadata.insert("updated_at".into(), json!(timestamp));
        metadata.insert("row_count".into(), json!(0));

        let available_types = ColumnType::ALL
            .iter()
            .map(|column_type| column_type.as_str())
            .collect::<Vec<_>>();

        Self {
            version: Some(SCHEMA_VERSION.to_string()),
            name: Some(table_name.to_string()),
            columns: vec![
                id_column,
                ColumnDefinition::system(CREATED_FIELD, "Created", ColumnType::Text),
                ColumnDefinition::system(UPDATED_FIELD, "Updated", ColumnType::Text),
                ColumnDefinition::system(ORDER_FIELD, "Order", ColumnType::Number),
            ],
            metadata: Some(metadata),
            extensions: Some(json!({ "available_types": available_types })),
            extra: Map::new(),
        }
    }

    /// Find a column by id.
    #[must_use]
    pub fn column(&self, id: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.id == id)
    }

    /// Display index of a column.
    #[must_use]
    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.id == id)
    }

    #[must_use]
    pub fn column_ids(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.id.as_str()).collect()
    }

    /// Columns a user sees and edits.
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns
            .iter()
            .filter(|column| !column.hidden && !column.is_protected())
    }

    /// Record row count and save time in the metadata bag.
    pub fn stamp_metadata(&mut self, row_count: usize, updated_at: &str) {
        let metadata = self.metadata.get_or_insert_with(Map::new);
        metadata.insert("row_count".into(), json!(row_count));
        metadata.insert("updated_at".into(), json!(updated_at));
    }

    /// Whether two schemas describe the same columns, ignoring metadata bags.
    #[must_use]
    pub fn same_columns(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_schema_has_hidden_system_columns() {
        let schema = TableSchema::initial("tasks", "2024-01-01T00:00:00.000Z");
        assert_eq!(schema.name.as_deref(), Some("tasks"));
        assert_eq!(
            schema.column_ids(),
            vec![ID_FIELD, CREATED_FIELD, UPDATED_FIELD, ORDER_FIELD]
        );
        assert!(schema
            .columns
            .iter()
            .all(|column| column.system && column.hidden));
        assert!(schema.column(ID_FIELD).is_some_and(|column| column.required));
        assert_eq!(schema.visible_columns().count(), 0);
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let raw = r#"{
            "version": "1.0",
            "table_name": "tasks",
            "columns": [{"id": "title", "name": "Title", "type": "text"}],
            "views": [{"kind": "grid"}]
        }"#;
        let schema: TableSchema = serde_json::from_str(raw).unwrap();
        assert!(schema.extra.contains_key("views"));

        let encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(encoded["views"][0]["kind"], "grid");
        assert_eq!(encoded["table_name"], "tasks");
    }

    #[test]
    fn test_stamp_metadata_creates_bag() {
        let mut schema = TableSchema::default();
        schema.stamp_metadata(3, "2024-01-01T00:00:00.000Z");
        let metadata = schema.metadata.unwrap();
        assert_eq!(metadata["row_count"], 3);
        assert_eq!(metadata["updated_at"], "2024-01-01T00:00:00.000Z");
    }
}
