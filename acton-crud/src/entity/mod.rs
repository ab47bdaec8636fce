//! Entity model
//!
//! Entities are plain serde types. Instead of reflecting over struct fields at
//! request time, every entity declares an [`EntitySchema`] once; the
//! [`EntityRegistry`] classifies it into an immutable [`EntityDescriptor`] on
//! first use and the fetch planner, the executor and the save validation only
//! ever read that descriptor.
//!
//! At runtime the core walks entities in their document form
//! ([`serde_json::Value`]), with the identifier stored under the `"id"` key.
//! Relationship targets that were not fetched are represented by identifier
//! stubs (`{"id": 3}`), so relationship structs should tolerate missing fields
//! (`#[serde(default)]`).
//!
//! # Example
//!
//! ```rust
//! use acton_crud::entity::{CollectionKind, Entity, EntitySchema, Relation};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Hobby {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Entity for Hobby {
//!     type Id = i64;
//!     const NAME: &'static str = "Hobby";
//!
//!     fn id(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new(Self::NAME).scalar("name")
//!     }
//! }
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Employee {
//!     id: Option<i64>,
//!     name: String,
//!     hobbies: Vec<Hobby>,
//! }
//!
//! impl Entity for Employee {
//!     type Id = i64;
//!     const NAME: &'static str = "Employee";
//!
//!     fn id(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new(Self::NAME)
//!             .scalar("name")
//!             .to_many("hobbies", Hobby::NAME, Relation::many_to_many(), CollectionKind::Set)
//!     }
//! }
//! ```

mod descriptor;
pub(crate) mod document;
mod registry;
mod schema;

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

pub use descriptor::{EntityDescriptor, FieldDescriptor, FieldKind, Traversal};
pub use registry::EntityRegistry;
pub use schema::{CollectionKind, EntitySchema, FieldDecl, FieldShape, Relation, RelationKind};

/// Anything that crosses the CRUD pipeline: entities and DTOs
pub trait Presentation:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
}

impl<T> Presentation for T where
    T: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
}

/// Identifier of an entity
pub trait EntityId:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> EntityId for T where
    T: Serialize
        + DeserializeOwned
        + Clone
        + PartialEq
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync
        + 'static
{
}

/// A persisted domain object with an identifier
pub trait Entity: Presentation {
    /// Identifier type
    type Id: EntityId;

    /// Entity name used in generated queries and as the registry key
    const NAME: &'static str;

    /// Identifier, `None` until the entity has been persisted
    fn id(&self) -> Option<Self::Id>;

    /// Declared fields of this entity
    fn schema() -> EntitySchema;
}
