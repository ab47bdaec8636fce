//! Repository trait definitions
//!
//! Both traits are object safe so services can hold them as
//! `Arc<dyn Repository<E>>` and detect the eager-fetch capability once, at
//! construction.

use async_trait::async_trait;

use super::pagination::{Page, Pagination};
use crate::entity::Entity;
use crate::error::Result;

/// Base persistence capability for one entity type
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Check whether an entity with the given id exists
    async fn exists_by_id(&self, id: &E::Id) -> Result<bool>;

    /// Find an entity by id
    ///
    /// Relationships come back as identifier stubs.
    async fn find_by_id(&self, id: &E::Id) -> Result<Option<E>>;

    /// Find one page of entities
    async fn find_all(&self, pagination: &Pagination) -> Result<Page<E>>;

    /// Find one page of identifiers
    ///
    /// Used by eager fetching so that page boundaries and totals never depend
    /// on relationship joins.
    async fn find_all_ids(&self, pagination: &Pagination) -> Result<Page<E::Id>>;

    /// Insert or replace an entity, returning the stored form
    async fn save(&self, entity: E) -> Result<E>;

    /// Delete an entity by id
    async fn delete_by_id(&self, id: &E::Id) -> Result<()>;

    /// Delete every entity
    async fn delete_all(&self) -> Result<()>;

    /// Check that every listed id exists
    async fn exists_all_by_id(&self, ids: &[E::Id]) -> Result<bool> {
        for id in ids {
            if !self.exists_by_id(id).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Find the listed entities that exist, in the order of `ids`
    async fn find_all_by_id(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_by_id(id).await? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// Insert or replace every entity, returning the stored forms in order
    async fn save_all(&self, entities: Vec<E>) -> Result<Vec<E>> {
        let mut saved = Vec::with_capacity(entities.len());
        for entity in entities {
            saved.push(self.save(entity).await?);
        }
        Ok(saved)
    }
}

/// Optional capability: hydrate relationship graphs in a single pass
#[async_trait]
pub trait FetchRelationshipRepository<E: Entity>: Send + Sync {
    /// Hydrate every listed entity
    ///
    /// The result follows the order of `ids`; an empty list issues no query.
    async fn find_all_eager_relationship(&self, ids: &[E::Id]) -> Result<Vec<E>>;

    /// Hydrate one entity, `None` when no row matches
    async fn find_by_id_eager_relationship(&self, id: &E::Id) -> Result<Option<E>>;
}
