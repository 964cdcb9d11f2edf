//! View data: the variables bound to a view for one render.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ViewError, ViewResult};

/// Mapping from variable name to value.
pub type ViewData = Map<String, Value>;

/// Convert anything serializable into view data.
///
/// `()` and `None` become an empty mapping. Anything that does not serialize
/// to a JSON object is rejected, since a view can only bind named variables.
pub fn to_view_data<T: Serialize + ?Sized>(data: &T) -> ViewResult<ViewData> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ViewData::new()),
        other => Err(ViewError::InvalidData(format!(
            "expected a mapping of variable names to values, got {}",
            kind_of(&other)
        ))),
    }
}

/// Merge `overrides` on top of `base`, the keys of `overrides` winning.
pub fn merge(base: &ViewData, overrides: &ViewData) -> ViewData {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Short description of a value's type for error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
