//! Document form of entities

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Key holding the identifier of an entity document
pub(crate) const ID_FIELD: &str = "id";

pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn from_document<T: DeserializeOwned>(document: Value) -> Result<T> {
    Ok(serde_json::from_value(document)?)
}

/// Non-null identifier of a document
pub(crate) fn document_id(document: &Value) -> Option<&Value> {
    document.get(ID_FIELD).filter(|id| !id.is_null())
}

/// Hashable form of an identifier value
///
/// Uses the JSON text so that `7` and `"7"` stay distinct.
pub(crate) fn id_key(id: &Value) -> String {
    id.to_string()
}

/// Identifier stub standing in for a relationship target that was not fetched
pub(crate) fn id_stub(id: Value) -> Value {
    let mut stub = serde_json::Map::new();
    stub.insert(ID_FIELD.to_string(), id);
    Value::Object(stub)
}
