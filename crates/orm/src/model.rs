//! Core Model Trait - Base definition for database entities
//!
//! Models are plain serde types. Their serialized field names are the
//! attribute names seen by observers and the column names handed to drivers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backends::Record;
use crate::error::{OrmError, OrmResult};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Core trait for database models
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name for this model
    fn table_name() -> &'static str;

    /// Primary key column name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Primary key of a persisted instance, `None` when not yet inserted
    fn primary_key(&self) -> Option<i64>;

    /// Set the primary key value for this model instance
    fn set_primary_key(&mut self, key: i64);

    /// Whether `created_at` / `updated_at` are stamped on save
    fn uses_timestamps() -> bool {
        false
    }

    /// Whether `delete` only sets `deleted_at`
    fn uses_soft_deletes() -> bool {
        false
    }
}

/// Serialize a model into its attribute map
pub(crate) fn to_record<M: Model>(model: &M) -> OrmResult<Record> {
    match serde_json::to_value(model)? {
        Value::Object(record) => Ok(record),
        other => Err(OrmError::Serialization(format!(
            "model for table '{}' must serialize to an object, got {}",
            M::table_name(),
            json_kind(&other)
        ))),
    }
}

/// Rebuild a model from an attribute map
pub(crate) fn from_record<M: Model>(record: Record) -> OrmResult<M> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        OrmError::Serialization(format!(
            "failed to build model for table '{}': {}",
            M::table_name(),
            e
        ))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
