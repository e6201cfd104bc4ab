//! Column model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Prefix reserved for system column ids.
pub const RESERVED_PREFIX: char = '_';

/// Row identifier field.
pub const ID_FIELD: &str = "_id";
/// Row creation timestamp field.
pub const CREATED_FIELD: &str = "_created";
/// Row last-mutation timestamp field.
pub const UPDATED_FIELD: &str = "_updated";
/// Dense zero-based display position field.
pub const ORDER_FIELD: &str = "_order";

/// Closed set of column type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Free text
    #[default]
    Text,
    /// Numeric value
    Number,
    /// Boolean flag
    Checkbox,
    /// Reserved; not constructible yet
    Multiselect,
    /// Reserved; not constructible yet
    Relation,
}

impl ColumnType {
    /// All declared type tags, including the reserved ones.
    pub const ALL: [Self; 5] = [
        Self::Text,
        Self::Number,
        Self::Checkbox,
        Self::Multiselect,
        Self::Relation,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Multiselect => "multiselect",
            Self::Relation => "relation",
        }
    }

    /// Whether new columns of this type may be created locally.
    #[must_use]
    pub const fn is_constructible(self) -> bool {
        matches!(self, Self::Text | Self::Number | Self::Checkbox)
    }

    /// Value used to backfill rows, or `None` for forward-declared types.
    #[must_use]
    pub fn zero_value(self) -> Option<Value> {
        match self {
            Self::Text => Some(Value::String(String::new())),
            Self::Number => Some(Value::from(0)),
            Self::Checkbox => Some(Value::Bool(false)),
            Self::Multiselect | Self::Relation => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|column_type| column_type.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("unknown column type '{}'", s.trim())))
    }
}

/// A column in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Stable slug identifier, unique within a schema
    pub id: String,
    /// Display name
    pub name: String,
    /// Type tag
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Display width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
    /// Free-form format hint for editors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Keys this model does not know about, kept for round-tripping
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ColumnDefinition {
    /// Create a plain user column.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            column_type,
            width: None,
            required: false,
            hidden: false,
            system: false,
            format: None,
            extra: Map::new(),
        }
    }

    /// Create a hidden system column.
    #[must_use]
    pub fn system(id: &str, name: &str, column_type: ColumnType) -> Self {
        Self {
            hidden: true,
            system: true,
            ..Self::new(id, name, column_type)
        }
    }

    /// System and reserved-prefix columns can be neither deleted nor renamed.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.system || is_reserved_id(&self.id)
    }

    /// Visible user columns must hold a value in every row.
    #[must_use]
    pub fn requires_backfill(&self) -> bool {
        !self.hidden && !self.is_protected()
    }
}

/// Whether an id lives in the reserved namespace.
#[must_use]
pub fn is_reserved_id(id: &str) -> bool {
    id.starts_with(RESERVED_PREFIX)
}
