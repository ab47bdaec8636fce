//! Entity and DTO conversion

use std::marker::PhantomData;

use serde_json::{Map, Value};

use crate::entity::document::{from_document, to_document};
use crate::entity::{Entity, Presentation};
use crate::error::Result;

/// Converts between an entity and its transfer representation
pub trait Mapper<E: Entity, D: Presentation>: Send + Sync {
    /// DTO to entity
    fn to_entity(&self, dto: D) -> Result<E>;

    /// Entity to DTO
    fn to_dto(&self, entity: E) -> Result<D>;

    /// Fields of a DTO partial update renamed to entity fields
    ///
    /// Only the sent fields are present. The default keeps names unchanged,
    /// which suits transfer forms that share the entity's field names.
    fn patch_to_entity(&self, fields: Map<String, Value>) -> Result<Map<String, Value>> {
        Ok(fields)
    }
}

/// Mapper that converts through the serialized form
///
/// Fields are matched by name; fields missing on the other side are dropped or
/// defaulted according to the target's serde attributes.
pub struct SerdeMapper<E, D> {
    _types: PhantomData<fn() -> (E, D)>,
}

impl<E, D> SerdeMapper<E, D> {
    /// Create a serde mapper
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<E, D> Default for SerdeMapper<E, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity, D: Presentation> Mapper<E, D> for SerdeMapper<E, D> {
    fn to_entity(&self, dto: D) -> Result<E> {
        from_document(to_document(&dto)?)
    }

    fn to_dto(&self, entity: E) -> Result<D> {
        from_document(to_document(&entity)?)
    }
}
