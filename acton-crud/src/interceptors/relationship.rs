//! Eager relationship hydration for reads

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::entity::{Entity, Presentation};
use crate::error::{Error, Result};
use crate::pipeline::{
    CallContext, Interceptor, Next, Operation, OperationMarkers, Output, Record,
    RELATIONSHIP_ORDER,
};
use crate::repository::{FetchRelationshipRepository, Page, Pagination, Repository};

const NAME: &str = "Relationship";

/// Serves reads through the eager-fetch repository
///
/// `find_by_id` hydrates one graph. `find_all` pages over identifiers first so
/// that joins never distort the page size or total, then hydrates the page in
/// one batch. Other operations pass through.
pub struct RelationshipInterceptor<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    fetch: Arc<dyn FetchRelationshipRepository<E>>,
}

impl<E: Entity> RelationshipInterceptor<E> {
    /// Page with `repository`, hydrate with `fetch`
    pub fn new(
        repository: Arc<dyn Repository<E>>,
        fetch: Arc<dyn FetchRelationshipRepository<E>>,
    ) -> Self {
        Self { repository, fetch }
    }

    async fn find_all<D: Presentation>(&self, pagination: &Pagination) -> Result<Page<Record<E, D>>> {
        let ids = self.repository.find_all_ids(pagination).await?;
        let entities = self.fetch.find_all_eager_relationship(&ids.content).await?;

        // keep the page order of the identifiers
        let mut ordered = Vec::with_capacity(entities.len());
        let mut remaining = entities;
        for id in &ids.content {
            if let Some(position) = remaining
                .iter()
                .position(|entity| entity.id().as_ref() == Some(id))
            {
                ordered.push(Record::Entity(remaining.swap_remove(position)));
            }
        }
        Ok(ids.with_content(ordered))
    }
}

#[async_trait]
impl<E: Entity, D: Presentation> Interceptor<E, D> for RelationshipInterceptor<E> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn order(&self) -> i32 {
        RELATIONSHIP_ORDER
    }

    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool {
        markers.fetch_relationships && capabilities.fetch_relationships
    }

    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        match operation {
            Operation::FindById(id) => {
                ctx.method_call(NAME);
                tracing::info!("find by ID using eager fetching for relationship.");
                let found = self
                    .fetch
                    .find_by_id_eager_relationship(&id)
                    .await
                    .and_then(|found| found.ok_or_else(|| Error::entity_not_found(E::NAME, &id)));
                ctx.method_finish(NAME);
                Ok(Output::Record(Record::Entity(found?)))
            }
            Operation::FindAll(pagination) => {
                ctx.method_call(NAME);
                tracing::info!("find all using eager fetching for relationship.");
                let page = self.find_all(&pagination).await;
                ctx.method_finish(NAME);
                Ok(Output::Page(page?))
            }
            other => next.run(other).await,
        }
    }
}
