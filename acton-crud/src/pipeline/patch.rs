//! Partial payloads
//!
//! A partial update names only the fields to change. Typed payloads cannot
//! tell an absent field from a defaulted one, so the fields are kept as the
//! JSON object the caller sent and merged into the stored document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::document::ID_FIELD;

/// Field names a partial payload is written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchForm {
    /// Entity field names
    #[default]
    Entity,
    /// Transfer-form field names
    Dto,
}

/// Fields of a partial update, as sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Field names the payload uses
    pub form: PatchForm,
    /// Sent fields by name
    pub fields: Map<String, Value>,
}

impl Patch {
    /// Patch in entity field names
    pub fn entity(fields: Map<String, Value>) -> Self {
        Self {
            form: PatchForm::Entity,
            fields,
        }
    }

    /// Patch in transfer-form field names
    pub fn dto(fields: Map<String, Value>) -> Self {
        Self {
            form: PatchForm::Dto,
            fields,
        }
    }

    /// Patch from a request body, `None` unless the body is an object
    pub fn from_value(body: Value, form: PatchForm) -> Option<Self> {
        match body {
            Value::Object(fields) => Some(Self { form, fields }),
            _ => None,
        }
    }

    /// Identifier carried by the payload, if set
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD).filter(|id| !id.is_null())
    }

    /// Document form of the sent fields
    pub fn to_document(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Write every non-null sent field over `document`
    ///
    /// Fields the payload does not name, or names with `null`, keep their
    /// stored value. Collections are values: an empty list replaces the
    /// stored one.
    pub fn apply_to(&self, document: &mut Value) {
        let Value::Object(target) = document else {
            return;
        };
        for (field, value) in self.fields.iter().filter(|(_, v)| !v.is_null()) {
            target.insert(field.clone(), value.clone());
        }
    }
}
