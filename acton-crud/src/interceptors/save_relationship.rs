//! Relationship integrity check on save

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::Capabilities;
use crate::entity::document::{document_id, to_document};
use crate::entity::{Entity, EntityRegistry, FieldKind, Presentation};
use crate::error::{Error, Result};
use crate::pipeline::{
    CallContext, Interceptor, Next, Operation, OperationMarkers, Output, Record,
    SAVE_RELATIONSHIP_ORDER,
};

const NAME: &str = "SaveRelationship";

/// Rejects saves that reference relationship targets which already have an id
///
/// Saving cascades to relationship targets, so a target carrying an id would be
/// overwritten with whatever partial state the caller sent.
#[derive(Debug, Clone)]
pub struct SaveRelationshipInterceptor {
    registry: Arc<EntityRegistry>,
}

impl SaveRelationshipInterceptor {
    /// Validate against the given registry
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }
}

// A bare scalar in a relationship slot is an identifier reference.
fn carries_id(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(_) => document_id(value).is_some(),
        _ => true,
    }
}

fn validate<E: Entity>(registry: &EntityRegistry, entity: &E) -> Result<()> {
    let descriptor = registry.descriptor_of::<E>()?;
    let document = to_document(entity)?;

    for field in descriptor.relationships() {
        let Some(value) = document.get(field.name) else {
            continue;
        };
        let violates = match field.kind {
            FieldKind::ToOne { .. } => carries_id(value),
            FieldKind::ToMany { .. } => value
                .as_array()
                .is_some_and(|items| items.iter().any(carries_id)),
            FieldKind::Scalar => false,
        };
        if violates {
            tracing::debug!(
                entity = E::NAME,
                field = field.name,
                "Relationship target already has an id"
            );
            return Err(Error::BadRequest(
                "Can't save an entity when the relationship already has an ID".to_string(),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl<E: Entity, D: Presentation> Interceptor<E, D> for SaveRelationshipInterceptor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn order(&self) -> i32 {
        SAVE_RELATIONSHIP_ORDER
    }

    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool {
        markers.validate_relationships && capabilities.relationship_bearing
    }

    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        ctx.method_call(NAME);
        for record in operation.records() {
            if let Record::Entity(entity) = record {
                validate(&self.registry, entity)?;
            }
        }
        ctx.method_finish(NAME);
        next.run(operation).await
    }
}
