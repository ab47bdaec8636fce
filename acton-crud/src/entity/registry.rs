//! Process-wide registry of entity descriptors

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use super::descriptor::EntityDescriptor;
use super::schema::EntitySchema;
use super::Entity;
use crate::error::{Error, Result};

static GLOBAL: LazyLock<Arc<EntityRegistry>> = LazyLock::new(|| Arc::new(EntityRegistry::new()));

struct Entry {
    schema: EntitySchema,
    descriptor: OnceCell<Arc<EntityDescriptor>>,
}

/// Registry of entity schemas keyed by entity name
///
/// Descriptors are classified lazily, once per type, and never change
/// afterwards. Reads take no lock beyond the map shard.
#[derive(Default)]
pub struct EntityRegistry {
    entries: DashMap<&'static str, Arc<Entry>>,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entries.len())
            .finish()
    }
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry for the whole process
    pub fn global() -> Arc<EntityRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Register an entity type
    pub fn register<E: Entity>(&self) -> &Self {
        self.register_schema(E::schema())
    }

    /// Register a schema
    ///
    /// Re-registering an identical schema keeps the classified descriptor.
    pub fn register_schema(&self, schema: EntitySchema) -> &Self {
        let name = schema.name;
        let unchanged = self
            .entries
            .get(name)
            .is_some_and(|entry| entry.schema == schema);
        if !unchanged {
            tracing::debug!(entity = name, "Registering entity schema");
            self.entries.insert(
                name,
                Arc::new(Entry {
                    schema,
                    descriptor: OnceCell::new(),
                }),
            );
        }
        self
    }

    /// Whether the named entity is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declared schema of the named entity
    pub fn schema(&self, name: &str) -> Result<EntitySchema> {
        self.entry(name).map(|entry| entry.schema.clone())
    }

    /// Descriptor of the named entity, classified on first use
    pub fn descriptor(&self, name: &str) -> Result<Arc<EntityDescriptor>> {
        let entry = self.entry(name)?;
        entry
            .descriptor
            .get_or_try_init(|| EntityDescriptor::from_schema(&entry.schema).map(Arc::new))
            .cloned()
    }

    /// Descriptor of `E`, registering it first if needed
    pub fn descriptor_of<E: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        if !self.contains(E::NAME) {
            self.register::<E>();
        }
        self.descriptor(E::NAME)
    }

    fn entry(&self, name: &str) -> Result<Arc<Entry>> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(format!("Entity type {} is not registered", name)))
    }
}
