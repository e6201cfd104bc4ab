//! Column and row factory.
//!
//! Pure functions that shape the inputs handed to the sync engine. Each one
//! takes the current rows/schema by reference and returns new values; nothing
//! here touches the persistence port.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    is_reserved_id, new_row_id, restamp_order, row_index, ColumnDefinition, ColumnType, Row,
    TableSchema, CREATED_FIELD, ID_FIELD, ORDER_FIELD, UPDATED_FIELD,
};
use crate::util::{timestamp_now, unix_millis_now};

fn slug_regex() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new("[a-z0-9]+").expect("Invalid regex"))
}

/// Derive a column id from a display name, unique among `existing_ids`.
///
/// The name is lower-cased and reduced to its `[a-z0-9]+` runs joined by `_`.
/// An empty result falls back to a time-based placeholder. Collisions get
/// `_1`, `_2`, ... appended.
///
/// # Examples
///
/// ```
/// use tabula_core::factory::generate_column_id;
///
/// assert_eq!(generate_column_id("Due Date", &["due_date"]), "due_date_1");
/// assert_eq!(generate_column_id("  Price (USD) ", &[] as &[&str]), "price_usd");
/// ```
pub fn generate_column_id<S: AsRef<str>>(name: &str, existing_ids: &[S]) -> String {
    let lowered = name.to_lowercase();
    let slug = slug_regex()
        .find_iter(&lowered)
        .map(|run| run.as_str())
        .collect::<Vec<_>>()
        .join("_");

    let base = if slug.is_empty() {
        format!("column_{}", unix_millis_now())
    } else {
        slug
    };

    let taken = |candidate: &str| existing_ids.iter().any(|id| id.as_ref() == candidate);
    if !taken(&base) {
        return base;
    }

    (1..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

/// Build a new row with zero values for every non-system column.
pub fn create_row(columns: &[ColumnDefinition], order: usize) -> Row {
    let now = timestamp_now();
    let mut row = Row::new();
    row.insert(ID_FIELD, Value::String(new_row_id()));
    row.insert(CREATED_FIELD, Value::String(now.clone()));
    row.insert(UPDATED_FIELD, Value::String(now));
    row.set_order(order);

    for column in columns.iter().filter(|column| !column.is_protected()) {
        if let Some(zero) = column.column_type.zero_value() {
            row.insert(column.id.clone(), zero);
        }
    }
    row
}

/// Append a fresh row at the end of the table.
pub fn append_row(schema: &TableSchema, rows: &[Row]) -> Vec<Row> {
    let mut next = rows.to_vec();
    next.push(create_row(&schema.columns, rows.len()));
    next
}

/// Append a column and backfill it into every row.
///
/// Every row's `_order` is re-stamped to its index as part of the rewrite.
pub fn add_column(
    schema: &TableSchema,
    rows: &[Row],
    name: &str,
    column_type: ColumnType,
) -> Result<(TableSchema, Vec<Row>)> {
    if !column_type.is_constructible() {
        return Err(Error::Validation(format!(
            "columns of type '{column_type}' cannot be created yet"
        )));
    }

    let id = generate_column_id(name, &schema.column_ids());
    let display_name = match name.trim() {
        "" => id.clone(),
        trimmed => trimmed.to_string(),
    };
    let zero = column_type.zero_value().unwrap_or(Value::Null);

    let mut next_schema = schema.clone();
    next_schema
        .columns
        .push(ColumnDefinition::new(id.clone(), display_name, column_type));

    let mut next_rows = rows.to_vec();
    for row in &mut next_rows {
        row.insert_missing(&id, zero.clone());
    }
    restamp_order(&mut next_rows);

    Ok((next_schema, next_rows))
}

/// Remove a user column and drop its key from every row.
///
/// System and reserved-prefix columns are rejected before anything changes.
pub fn remove_column(
    schema: &TableSchema,
    rows: &[Row],
    column_id: &str,
) -> Result<(TableSchema, Vec<Row>)> {
    ensure_unprotected(schema, column_id)?;

    let mut next_schema = schema.clone();
    next_schema.columns.retain(|column| column.id != column_id);

    let mut next_rows = rows.to_vec();
    for row in &mut next_rows {
        row.remove(column_id);
    }
    restamp_order(&mut next_rows);

    Ok((next_schema, next_rows))
}

/// Change a column's display name. The id stays stable.
pub fn rename_column(schema: &TableSchema, column_id: &str, name: &str) -> Result<TableSchema> {
    ensure_unprotected(schema, column_id)?;

    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("column name cannot be empty".to_string()));
    }

    let index = schema
        .column_index(column_id)
        .ok_or_else(|| Error::Validation(format!("unknown column '{column_id}'")))?;

    let mut next = schema.clone();
    next.columns[index].name = name.to_string();
    Ok(next)
}

/// Move the column at `from_id` to the index of `to_id`.
///
/// Unknown or identical ids leave the schema as is.
pub fn reorder_columns(schema: &TableSchema, from_id: &str, to_id: &str) -> TableSchema {
    let mut next = schema.clone();
    if from_id == to_id {
        return next;
    }
    if let (Some(from), Some(to)) = (schema.column_index(from_id), schema.column_index(to_id)) {
        move_item(&mut next.columns, from, to);
    }
    next
}

/// Move the row `from_id` to the index of `to_id`.
///
/// A reorder is a content mutation: every row gets a fresh `_order` and
/// `_updated`. Unknown or identical ids leave the rows as is.
pub fn reorder_rows(rows: &[Row], from_id: &str, to_id: &str) -> Vec<Row> {
    let mut next = rows.to_vec();
    if from_id == to_id {
        return next;
    }
    let (Some(from), Some(to)) = (row_index(rows, from_id), row_index(rows, to_id)) else {
        return next;
    };

    move_item(&mut next, from, to);

    let now = timestamp_now();
    for (index, row) in next.iter_mut().enumerate() {
        row.set_order(index);
        row.touch(&now);
    }
    next
}

/// Delete a row and keep `_order` dense.
pub fn remove_row(rows: &[Row], row_id: &str) -> Vec<Row> {
    let mut next = rows.to_vec();
    if let Some(index) = row_index(rows, row_id) {
        next.remove(index);
        restamp_order(&mut next);
    }
    next
}

/// Set one cell, coercing the value to the column's type.
pub fn update_cell(
    schema: &TableSchema,
    rows: &[Row],
    row_id: &str,
    column_id: &str,
    value: &Value,
) -> Result<Vec<Row>> {
    ensure_unprotected(schema, column_id)?;
    let column = schema
        .column(column_id)
        .ok_or_else(|| Error::Validation(format!("unknown column '{column_id}'")))?;
    let index = row_index(rows, row_id)
        .ok_or_else(|| Error::Validation(format!("unknown row '{row_id}'")))?;

    let coerced = coerce_value(column.column_type, value)?;

    let mut next = rows.to_vec();
    let row = &mut next[index];
    row.insert(column_id, coerced);
    row.touch(&timestamp_now());
    Ok(next)
}

/// Convert a raw value to the representation a column type stores.
pub fn coerce_value(column_type: ColumnType, value: &Value) -> Result<Value> {
    let invalid = || {
        Error::Validation(format!(
            "value {value} is not valid for a {column_type} column"
        ))
    };

    match column_type {
        ColumnType::Text => Ok(match value {
            Value::String(text) => Value::String(text.clone()),
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string()),
        }),
        ColumnType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::Null => Ok(Value::from(0)),
            Value::Bool(flag) => Ok(Value::from(u8::from(*flag))),
            Value::String(text) => parse_number(text).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        ColumnType::Checkbox => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Null => Ok(Value::Bool(false)),
            Value::Number(number) => Ok(Value::Bool(number.as_f64().is_some_and(|n| n != 0.0))),
            Value::String(text) => parse_flag(text).map(Value::Bool).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        ColumnType::Multiselect | ColumnType::Relation => Err(Error::Validation(format!(
            "{column_type} columns are not editable yet"
        ))),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Value::from(0));
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::from(integer));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" | "x" => Some(true),
        "false" | "no" | "n" | "0" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Fill missing values for visible user columns.
///
/// Returns the repaired rows and whether anything was added.
pub fn backfill_rows(schema: &TableSchema, rows: &[Row]) -> (Vec<Row>, bool) {
    let mut next = rows.to_vec();
    let mut changed = false;
    for column in schema.columns.iter().filter(|column| column.requires_backfill()) {
        let Some(zero) = column.column_type.zero_value() else {
            continue;
        };
        for row in &mut next {
            changed |= row.insert_missing(&column.id, zero.clone());
        }
    }
    (next, changed)
}

/// Fill system fields a hand-edited file may lack.
///
/// Missing `_id` values get a fresh id and missing `_created`/`_updated` get
/// `timestamp`; existing values are kept. If any `_order` is missing or not a
/// number, every row is re-stamped to its index.
pub fn backfill_system_fields(rows: &[Row], timestamp: &str) -> (Vec<Row>, bool) {
    let mut next = rows.to_vec();
    let mut changed = false;
    for row in &mut next {
        if row.id().is_none() {
            row.insert(ID_FIELD, Value::String(new_row_id()));
            changed = true;
        }
        changed |= row.insert_missing(CREATED_FIELD, Value::String(timestamp.to_string()));
        changed |= row.insert_missing(UPDATED_FIELD, Value::String(timestamp.to_string()));
    }

    let order_broken = next
        .iter()
        .any(|row| !row.get(ORDER_FIELD).is_some_and(Value::is_number));
    if order_broken {
        restamp_order(&mut next);
        changed = true;
    }
    (next, changed)
}

/// A required column left empty in some row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub row_id: Option<String>,
    pub column_id: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} is missing required column '{}'",
            self.row_id.as_deref().unwrap_or("<unsaved>"),
            self.column_id
        )
    }
}

/// Advisory check of required columns. Nothing is rejected on these.
pub fn validate_required(schema: &TableSchema, rows: &[Row]) -> Vec<ValidationIssue> {
    let required = schema
        .columns
        .iter()
        .filter(|column| column.required && !column.is_protected())
        .collect::<Vec<_>>();

    rows.iter()
        .flat_map(|row| {
            required.iter().filter_map(move |column| {
                let empty = match row.get(&column.id) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(text)) => text.trim().is_empty(),
                    Some(_) => false,
                };
                empty.then(|| ValidationIssue {
                    row_id: row.id().map(str::to_string),
                    column_id: column.id.clone(),
                })
            })
        })
        .collect()
}

fn ensure_unprotected(schema: &TableSchema, column_id: &str) -> Result<()> {
    let protected = is_reserved_id(column_id)
        || schema
            .column(column_id)
            .is_some_and(ColumnDefinition::is_protected);
    if protected {
        Err(Error::ProtectedColumn(column_id.to_string()))
    } else {
        Ok(())
    }
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    let item = items.remove(from);
    items.insert(to, item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::is_order_dense;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema_with(columns: &[(&str, ColumnType)]) -> TableSchema {
        let mut schema = TableSchema::initial("tasks", "2024-01-01T00:00:00.000Z");
        for (id, column_type) in columns {
            schema
                .columns
                .push(ColumnDefinition::new(*id, *id, *column_type));
        }
        schema
    }

    fn rows_for(schema: &TableSchema, count: usize) -> Vec<Row> {
        (0..count)
            .map(|order| create_row(&schema.columns, order))
            .collect()
    }

    fn ids(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|row| row.id().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_generate_column_id_slugs() {
        assert_eq!(generate_column_id("Due Date", &[] as &[&str]), "due_date");
        assert_eq!(generate_column_id("__Weird--Name!!", &[] as &[&str]), "weird_name");
        assert_eq!(generate_column_id("Task #2", &[] as &[&str]), "task_2");
    }

    #[test]
    fn test_generate_column_id_dedups() {
        assert_eq!(generate_column_id("Due Date", &["due_date"]), "due_date_1");
        assert_eq!(
            generate_column_id("Due Date", &["due_date", "due_date_1"]),
            "due_date_2"
        );
    }

    #[test]
    fn test_generate_column_id_is_deterministic() {
        let existing = ["title", "notes"];
        assert_eq!(
            generate_column_id("Notes", &existing),
            generate_column_id("Notes", &existing)
        );
    }

    #[test]
    fn test_generate_column_id_fallback() {
        let id = generate_column_id("", &[] as &[&str]);
        assert!(id.starts_with("column_"));
        assert!(id.len() > "column_".len());

        let symbols = generate_column_id("!!!", &[] as &[&str]);
        assert!(symbols.starts_with("column_"));
    }

    #[test]
    fn test_create_row_zero_values() {
        let schema = schema_with(&[
            ("title", ColumnType::Text),
            ("points", ColumnType::Number),
            ("done", ColumnType::Checkbox),
            ("tags", ColumnType::Multiselect),
        ]);
        let row = create_row(&schema.columns, 3);

        assert!(row.id().is_some_and(|id| id.starts_with("row_")));
        assert_eq!(row.order(), Some(3));
        assert_eq!(row.created(), row.updated());
        assert_eq!(row.get("title"), Some(&json!("")));
        assert_eq!(row.get("points"), Some(&json!(0)));
        assert_eq!(row.get("done"), Some(&json!(false)));
        assert!(!row.contains("tags"));
    }

    #[test]
    fn test_add_column_backfills_and_restamps() {
        let schema = schema_with(&[("title", ColumnType::Text)]);
        let mut rows = rows_for(&schema, 3);
        rows.swap(0, 2);

        let (next_schema, next_rows) =
            add_column(&schema, &rows, "Story Points", ColumnType::Number).unwrap();

        let column = next_schema.columns.last().unwrap();
        assert_eq!(column.id, "story_points");
        assert_eq!(column.name, "Story Points");
        assert!(next_rows
            .iter()
            .all(|row| row.get("story_points") == Some(&json!(0))));
        assert!(is_order_dense(&next_rows));
        assert_eq!(ids(&next_rows), ids(&rows));
    }

    #[test]
    fn test_add_column_dedups_against_schema() {
        let schema = schema_with(&[("due_date", ColumnType::Text)]);
        let (next_schema, _) = add_column(&schema, &[], "Due Date", ColumnType::Text).unwrap();
        assert_eq!(next_schema.columns.last().unwrap().id, "due_date_1");
    }

    #[test]
    fn test_add_column_rejects_reserved_types() {
        let schema = schema_with(&[]);
        let error = add_column(&schema, &[], "Links", ColumnType::Relation).unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn test_remove_column_drops_key() {
        let schema = schema_with(&[("title", ColumnType::Text), ("done", ColumnType::Checkbox)]);
        let rows = rows_for(&schema, 2);

        let (next_schema, next_rows) = remove_column(&schema, &rows, "done").unwrap();
        assert!(next_schema.column("done").is_none());
        assert!(next_rows.iter().all(|row| !row.contains("done")));
        assert!(next_rows.iter().all(|row| row.contains("title")));
        assert!(is_order_dense(&next_rows));
    }

    #[test]
    fn test_remove_system_column_is_rejected() {
        let mut schema = schema_with(&[("title", ColumnType::Text), ("owner", ColumnType::Text)]);
        schema.columns.last_mut().unwrap().system = true;
        let rows = rows_for(&schema, 2);

        for column_id in [ID_FIELD, "owner", "_anything"] {
            let error = remove_column(&schema, &rows, column_id).unwrap_err();
            assert!(matches!(error, Error::ProtectedColumn(ref id) if id == column_id));
        }
        assert!(rows.iter().all(|row| row.contains("owner")));
    }

    #[test]
    fn test_rename_column() {
        let schema = schema_with(&[("title", ColumnType::Text)]);
        let renamed = rename_column(&schema, "title", "  Headline ").unwrap();
        assert_eq!(renamed.column("title").unwrap().name, "Headline");

        assert!(matches!(
            rename_column(&schema, ID_FIELD, "Key"),
            Err(Error::ProtectedColumn(_))
        ));
        assert!(matches!(
            rename_column(&schema, "missing", "Key"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_reorder_columns() {
        let schema = schema_with(&[
            ("a", ColumnType::Text),
            ("b", ColumnType::Text),
            ("c", ColumnType::Text),
        ]);
        let moved = reorder_columns(&schema, "c", "a");
        let visible = moved
            .visible_columns()
            .map(|column| column.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(visible, vec!["c", "a", "b"]);

        assert_eq!(reorder_columns(&schema, "a", "a"), schema);
        assert_eq!(reorder_columns(&schema, "a", "gone"), schema);
    }

    #[test]
    fn test_reorder_rows_restamps_order_and_updated() {
        let schema = schema_with(&[("title", ColumnType::Text)]);
        let mut rows = rows_for(&schema, 4);
        for row in &mut rows {
            row.touch("2000-01-01T00:00:00.000Z");
        }
        let original = ids(&rows);

        let moved = reorder_rows(&rows, &original[0], &original[2]);
        assert_eq!(
            ids(&moved),
            vec![
                original[1].clone(),
                original[2].clone(),
                original[0].clone(),
                original[3].clone()
            ]
        );
        assert!(is_order_dense(&moved));
        assert!(moved
            .iter()
            .all(|row| row.updated() != Some("2000-01-01T00:00:00.000Z")));
    }

    #[test]
    fn test_reorder_rows_ignores_missing_ids() {
        let schema = schema_with(&[("title", ColumnType::Text)]);
        let rows = rows_for(&schema, 2);
        let first = rows[0].id().unwrap().to_string();

        assert_eq!(reorder_rows(&rows, &first, "row_deleted"), rows);
        assert_eq!(reorder_rows(&rows, &first, &first), rows);
    }

    #[test]
    fn test_remove_row_keeps_order_dense() {
        let schema = schema_with(&[("title", ColumnType::Text)]);
        let rows = rows_for(&schema, 3);
        let middle = rows[1].id().unwrap().to_string();

        let next = remove_row(&rows, &middle);
        assert_eq!(next.len(), 2);
        assert!(is_order_dense(&next));
        assert_eq!(remove_row(&next, "row_unknown"), next);
    }

    #[test]
    fn test_update_cell_coerces_and_touches() {
        let schema = schema_with(&[("points", ColumnType::Number), ("done", ColumnType::Checkbox)]);
        let mut rows = rows_for(&schema, 1);
        rows[0].touch("2000-01-01T00:00:00.000Z");
        let row_id = rows[0].id().unwrap().to_string();

        let rows = update_cell(&schema, &rows, &row_id, "points", &json!("42")).unwrap();
        let rows = update_cell(&schema, &rows, &row_id, "done", &json!("yes")).unwrap();
        assert_eq!(rows[0].get("points"), Some(&json!(42)));
        assert_eq!(rows[0].get("done"), Some(&json!(true)));
        assert_ne!(rows[0].updated(), Some("2000-01-01T00:00:00.000Z"));

        assert!(update_cell(&schema, &rows, &row_id, "points", &json!("lots")).is_err());
        assert!(matches!(
            update_cell(&schema, &rows, &row_id, ID_FIELD, &json!("x")),
            Err(Error::ProtectedColumn(_))
        ));
    }

    #[test]
    fn test_coerce_value_text_and_number() {
        assert_eq!(coerce_value(ColumnType::Text, &json!(12)).unwrap(), json!("12"));
        assert_eq!(coerce_value(ColumnType::Number, &json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(coerce_value(ColumnType::Number, &json!("")).unwrap(), json!(0));
        assert!(coerce_value(ColumnType::Relation, &json!("x")).is_err());
    }

    #[test]
    fn test_backfill_system_fields_keeps_existing_values() {
        let mut kept = Row::new();
        kept.insert(ID_FIELD, json!("row_keep"));
        kept.insert(CREATED_FIELD, json!("2020-01-01T00:00:00.000Z"));
        kept.insert(ORDER_FIELD, json!(0));
        let mut bare = Row::new();
        bare.insert("title", json!("imported"));
        bare.insert(ORDER_FIELD, json!("second"));

        let (rows, changed) = backfill_system_fields(&[kept, bare], "2024-01-01T00:00:00.000Z");
        assert!(changed);
        assert_eq!(rows[0].id(), Some("row_keep"));
        assert_eq!(rows[0].created(), Some("2020-01-01T00:00:00.000Z"));
        assert_eq!(rows[0].updated(), Some("2024-01-01T00:00:00.000Z"));
        assert!(rows[1].id().is_some_and(|id| id.starts_with("row_")));
        assert_eq!(rows[1].created(), Some("2024-01-01T00:00:00.000Z"));
        assert!(is_order_dense(&rows));

        let (again, changed_again) = backfill_system_fields(&rows, "2025-01-01T00:00:00.000Z");
        assert!(!changed_again);
        assert_eq!(again, rows);
    }

    #[test]
    fn test_backfill_rows() {
        let schema = schema_with(&[("title", ColumnType::Text), ("done", ColumnType::Checkbox)]);
        let mut row = Row::new();
        row.insert(ID_FIELD, json!("row_1"));
        row.insert("title", json!("kept"));

        let (rows, changed) = backfill_rows(&schema, &[row]);
        assert!(changed);
        assert_eq!(rows[0].get("title"), Some(&json!("kept")));
        assert_eq!(rows[0].get("done"), Some(&json!(false)));

        let (_, changed_again) = backfill_rows(&schema, &rows);
        assert!(!changed_again);
    }

    #[test]
    fn test_validate_required_is_advisory() {
        let mut schema = schema_with(&[("title", ColumnType::Text)]);
        schema.columns.last_mut().unwrap().required = true;
        let rows = rows_for(&schema, 2);

        let issues = validate_required(&schema, &rows);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].column_id, "title");
        assert!(issues[0].to_string().contains("title"));
    }
}
