//! Eager-fetch repository backed by the planner and executor

use std::sync::Arc;

use async_trait::async_trait;

use super::executor::QueryExecutor;
use super::planner::QueryPlanner;
use super::query::QueryEngine;
use crate::config::FetchConfig;
use crate::entity::document::{from_document, to_document};
use crate::entity::{Entity, EntityRegistry};
use crate::error::Result;
use crate::repository::FetchRelationshipRepository;

/// [`FetchRelationshipRepository`] for every registered entity type
///
/// ```rust,ignore
/// let engine = Arc::new(MemoryStore::new(registry.clone()));
/// let eager = EagerFetchRepository::new(engine, registry);
/// let employee: Option<Employee> = eager.find_by_id_eager_relationship(&7).await?;
/// ```
pub struct EagerFetchRepository<Q: ?Sized> {
    executor: QueryExecutor<Q>,
}

impl<Q: QueryEngine + ?Sized> EagerFetchRepository<Q> {
    /// Create a repository with default fetch settings
    pub fn new(engine: Arc<Q>, registry: Arc<EntityRegistry>) -> Self {
        Self::with_config(engine, registry, &FetchConfig::default())
    }

    /// Create a repository from configuration
    pub fn with_config(engine: Arc<Q>, registry: Arc<EntityRegistry>, config: &FetchConfig) -> Self {
        Self {
            executor: QueryExecutor::new(QueryPlanner::with_config(registry, config), engine),
        }
    }

    /// Underlying executor
    pub fn executor(&self) -> &QueryExecutor<Q> {
        &self.executor
    }

    fn ensure_registered<E: Entity>(&self) -> Result<()> {
        self.executor.planner().registry().descriptor_of::<E>().map(|_| ())
    }
}

#[async_trait]
impl<E, Q> FetchRelationshipRepository<E> for EagerFetchRepository<Q>
where
    E: Entity,
    Q: QueryEngine + ?Sized + 'static,
{
    async fn find_all_eager_relationship(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_registered::<E>()?;

        let ids = ids.iter().map(to_document).collect::<Result<Vec<_>>>()?;
        self.executor
            .fetch_by_ids(E::NAME, ids)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    async fn find_by_id_eager_relationship(&self, id: &E::Id) -> Result<Option<E>> {
        self.ensure_registered::<E>()?;

        let id = to_document(id)?;
        self.executor
            .fetch_by_id(E::NAME, id)
            .await?
            .map(from_document)
            .transpose()
    }
}
