//! Data models for Tabula

mod column;
mod row;
mod schema;
mod workspace;

pub use column::{
    is_reserved_id, ColumnDefinition, ColumnType, CREATED_FIELD, ID_FIELD, ORDER_FIELD,
    RESERVED_PREFIX, UPDATED_FIELD,
};
pub use row::{is_order_dense, new_row_id, restamp_order, row_index, Row};
pub use schema::TableSchema;
pub use workspace::{normalize_data_path, schema_path_for, Snapshot, Workspace};
