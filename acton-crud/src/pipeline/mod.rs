//! Ordered interception pipeline
//!
//! Every CRUD call is an [`Operation`] value that travels through an ordered
//! list of [`Interceptor`]s before reaching the [`BaseOperation`]. The list is
//! built once per [`OperationKind`] when the service is constructed: an
//! interceptor is included only when the operation carries its marker and the
//! service has the capability it needs. Lower [`Interceptor::order`] values
//! sit further out.
//!
//! ```text
//! Logging(0) -> Caching(100) -> Mapping(200) -> SaveRelationship(250)
//!            -> Relationship(300) -> base operation
//! ```

mod markers;
mod patch;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capabilities;
use crate::entity::document::to_document;
use crate::entity::{Entity, Presentation};
use crate::error::{Error, Result};
use crate::repository::{Page, Pagination};

pub use markers::{CacheMarker, LogMarker, MappingMarker, OperationMarkers};
pub use patch::{Patch, PatchForm};

/// Order of the logging interceptor
pub const LOGGING_ORDER: i32 = 0;
/// Order of the caching interceptor
pub const CACHE_ORDER: i32 = 100;
/// Order of the mapping interceptor
pub const MAPPING_ORDER: i32 = 200;
/// Order of the save-relationship validation interceptor
pub const SAVE_RELATIONSHIP_ORDER: i32 = 250;
/// Order of the relationship-fetch interceptor
pub const RELATIONSHIP_ORDER: i32 = 300;

/// Kind of a CRUD operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Page of entities
    FindAll,
    /// One entity by id
    FindById,
    /// Create
    Save,
    /// Full replacement
    UpdateById,
    /// Partial update
    PatchById,
    /// Delete
    DeleteById,
    /// Create many
    SaveAll,
    /// Replace many
    UpdateAll,
    /// Partially update many
    PatchAll,
    /// Delete every row
    DeleteAll,
}

impl OperationKind {
    /// Every kind
    pub const ALL: [OperationKind; 10] = [
        Self::FindAll,
        Self::FindById,
        Self::Save,
        Self::UpdateById,
        Self::PatchById,
        Self::DeleteById,
        Self::SaveAll,
        Self::UpdateAll,
        Self::PatchAll,
        Self::DeleteAll,
    ];

    /// Method name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindAll => "find_all",
            Self::FindById => "find_by_id",
            Self::Save => "save",
            Self::UpdateById => "update_by_id",
            Self::PatchById => "patch_by_id",
            Self::DeleteById => "delete_by_id",
            Self::SaveAll => "save_all",
            Self::UpdateAll => "update_all",
            Self::PatchAll => "patch_all",
            Self::DeleteAll => "delete_all",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload or result value: an entity or its DTO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[serde(bound = "E: Presentation, D: Presentation")]
pub enum Record<E, D> {
    /// Entity form
    Entity(E),
    /// Transfer form
    Dto(D),
}

impl<E: Presentation, D: Presentation> Record<E, D> {
    /// Document form of whichever value is held
    pub fn to_document(&self) -> Result<Value> {
        match self {
            Self::Entity(entity) => to_document(entity),
            Self::Dto(dto) => to_document(dto),
        }
    }

    /// Entity, if held
    pub fn into_entity(self) -> Option<E> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Dto(_) => None,
        }
    }

    /// DTO, if held
    pub fn into_dto(self) -> Option<D> {
        match self {
            Self::Dto(dto) => Some(dto),
            Self::Entity(_) => None,
        }
    }
}

/// Result of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[serde(bound = "E: Presentation, D: Presentation")]
pub enum Output<E, D> {
    /// One value
    Record(Record<E, D>),
    /// One page of values
    Page(Page<Record<E, D>>),
    /// Results of a bulk write
    List(Vec<Record<E, D>>),
    /// Nothing
    Empty,
}

impl<E: Presentation, D: Presentation> Output<E, D> {
    /// Identifier of a single result, if any
    pub fn id(&self) -> Result<Option<Value>> {
        match self {
            Self::Record(record) => Ok(record
                .to_document()?
                .get(crate::entity::document::ID_FIELD)
                .filter(|id| !id.is_null())
                .cloned()),
            Self::Page(_) | Self::List(_) | Self::Empty => Ok(None),
        }
    }

    /// Convert every held record, keeping the output shape
    pub fn try_map_records(
        self,
        mut f: impl FnMut(Record<E, D>) -> Result<Record<E, D>>,
    ) -> Result<Self> {
        Ok(match self {
            Self::Record(record) => Self::Record(f(record)?),
            Self::Page(page) => Self::Page(page.try_map(f)?),
            Self::List(records) => {
                Self::List(records.into_iter().map(f).collect::<Result<Vec<_>>>()?)
            }
            Self::Empty => Self::Empty,
        })
    }
}

/// One CRUD call
#[derive(Debug, Clone)]
pub enum Operation<E: Entity, D> {
    /// Page of entities
    FindAll(Pagination),
    /// One entity by id
    FindById(E::Id),
    /// Create
    Save(Record<E, D>),
    /// Full replacement
    UpdateById(E::Id, Record<E, D>),
    /// Partial update
    PatchById(E::Id, Patch),
    /// Delete
    DeleteById(E::Id),
    /// Create many
    SaveAll(Vec<Record<E, D>>),
    /// Replace many, each identified by its own id
    UpdateAll(Vec<Record<E, D>>),
    /// Partially update many, each identified by its own id
    PatchAll(Vec<Patch>),
    /// Delete every row
    DeleteAll,
}

impl<E: Entity, D: Presentation> Operation<E, D> {
    /// Kind of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::FindAll(_) => OperationKind::FindAll,
            Self::FindById(_) => OperationKind::FindById,
            Self::Save(_) => OperationKind::Save,
            Self::UpdateById(..) => OperationKind::UpdateById,
            Self::PatchById(..) => OperationKind::PatchById,
            Self::DeleteById(_) => OperationKind::DeleteById,
            Self::SaveAll(_) => OperationKind::SaveAll,
            Self::UpdateAll(_) => OperationKind::UpdateAll,
            Self::PatchAll(_) => OperationKind::PatchAll,
            Self::DeleteAll => OperationKind::DeleteAll,
        }
    }

    /// Named arguments in declaration order
    ///
    /// Names are `pagination`, `id`, `data` and `datas`; key expressions
    /// refer to them.
    pub fn arguments(&self) -> Result<Vec<(&'static str, Value)>> {
        Ok(match self {
            Self::FindAll(pagination) => vec![("pagination", to_document(pagination)?)],
            Self::FindById(id) | Self::DeleteById(id) => vec![("id", to_document(id)?)],
            Self::Save(data) => vec![("data", data.to_document()?)],
            Self::UpdateById(id, data) => vec![
                ("data", data.to_document()?),
                ("id", to_document(id)?),
            ],
            Self::PatchById(id, patch) => {
                vec![("data", patch.to_document()), ("id", to_document(id)?)]
            }
            Self::SaveAll(datas) | Self::UpdateAll(datas) => vec![(
                "datas",
                Value::Array(
                    datas
                        .iter()
                        .map(Record::to_document)
                        .collect::<Result<Vec<_>>>()?,
                ),
            )],
            Self::PatchAll(patches) => vec![(
                "datas",
                Value::Array(patches.iter().map(Patch::to_document).collect()),
            )],
            Self::DeleteAll => Vec::new(),
        })
    }

    /// Record arguments; empty for operations that carry none
    pub fn records(&self) -> &[Record<E, D>] {
        match self {
            Self::Save(data) | Self::UpdateById(_, data) => std::slice::from_ref(data),
            Self::SaveAll(datas) | Self::UpdateAll(datas) => datas,
            _ => &[],
        }
    }

    /// Replace every record argument
    pub fn try_map_records(
        self,
        mut f: impl FnMut(Record<E, D>) -> Result<Record<E, D>>,
    ) -> Result<Self> {
        Ok(match self {
            Self::Save(data) => Self::Save(f(data)?),
            Self::UpdateById(id, data) => Self::UpdateById(id, f(data)?),
            Self::SaveAll(datas) => {
                Self::SaveAll(datas.into_iter().map(f).collect::<Result<Vec<_>>>()?)
            }
            Self::UpdateAll(datas) => {
                Self::UpdateAll(datas.into_iter().map(f).collect::<Result<Vec<_>>>()?)
            }
            other => other,
        })
    }

    /// Replace every partial payload
    pub fn try_map_patches(self, mut f: impl FnMut(Patch) -> Result<Patch>) -> Result<Self> {
        Ok(match self {
            Self::PatchById(id, patch) => Self::PatchById(id, f(patch)?),
            Self::PatchAll(patches) => {
                Self::PatchAll(patches.into_iter().map(f).collect::<Result<Vec<_>>>()?)
            }
            other => other,
        })
    }
}

/// Static context of one operation kind
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Entity name
    pub entity: &'static str,
    /// Operation kind
    pub kind: OperationKind,
    /// Markers of the operation
    pub markers: OperationMarkers,
    /// Capabilities of the service
    pub capabilities: Capabilities,
}

impl CallContext {
    /// Method signature used in logs, e.g. `Employee::find_by_id`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.entity, self.kind)
    }

    /// Whether per-behavior call records should be emitted
    pub fn trace_enabled(&self) -> bool {
        self.capabilities.loggable
            || self
                .markers
                .logging
                .as_ref()
                .is_some_and(|marker| marker.activate_logging)
    }

    /// Per-behavior call record
    pub fn method_call(&self, behavior: &str) {
        if self.trace_enabled() {
            tracing::debug!(
                method = %self.signature(),
                behavior,
                "Method call: {}, with {} marker",
                self.signature(),
                behavior
            );
        }
    }

    /// Per-behavior finish record
    pub fn method_finish(&self, behavior: &str) {
        if self.trace_enabled() {
            tracing::debug!(
                method = %self.signature(),
                behavior,
                "Method finish: {}, with {} marker",
                self.signature(),
                behavior
            );
        }
    }
}

/// The operation at the end of the chain
#[async_trait]
pub trait BaseOperation<E: Entity, D: Presentation>: Send + Sync {
    /// Run the operation
    async fn execute(&self, operation: Operation<E, D>) -> Result<Output<E, D>>;
}

/// One pluggable behavior
#[async_trait]
pub trait Interceptor<E: Entity, D: Presentation>: Send + Sync {
    /// Behavior name used in logs
    fn name(&self) -> &'static str;

    /// Position in the chain, lower is further out
    fn order(&self) -> i32;

    /// Whether to include this interceptor for an operation
    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool;

    /// Wrap the rest of the chain
    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>>;
}

/// Remainder of a chain
pub struct Next<'a, E: Entity, D: Presentation> {
    interceptors: &'a [Arc<dyn Interceptor<E, D>>],
    ctx: &'a CallContext,
    base: &'a dyn BaseOperation<E, D>,
}

impl<'a, E: Entity, D: Presentation> Next<'a, E, D> {
    /// Run the next interceptor, or the base operation at the end
    pub async fn run(self, operation: Operation<E, D>) -> Result<Output<E, D>> {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    interceptors: rest,
                    ctx: self.ctx,
                    base: self.base,
                };
                first.intercept(operation, self.ctx, next).await
            }
            None => self.base.execute(operation).await,
        }
    }
}

struct Chain<E: Entity, D: Presentation> {
    ctx: CallContext,
    interceptors: Vec<Arc<dyn Interceptor<E, D>>>,
}

/// Per-operation interceptor chains over one base operation
pub struct Pipeline<E: Entity, D: Presentation> {
    chains: HashMap<OperationKind, Chain<E, D>>,
    base: Arc<dyn BaseOperation<E, D>>,
}

impl<E: Entity, D: Presentation> Pipeline<E, D> {
    /// Build one chain per operation kind
    ///
    /// `markers` supplies the markers of each kind. Interceptors with equal
    /// order keep their registration order.
    pub fn new(
        interceptors: Vec<Arc<dyn Interceptor<E, D>>>,
        markers: impl Fn(OperationKind) -> OperationMarkers,
        capabilities: Capabilities,
        base: Arc<dyn BaseOperation<E, D>>,
    ) -> Self {
        let mut sorted = interceptors;
        sorted.sort_by_key(|interceptor| interceptor.order());

        let chains = OperationKind::ALL
            .into_iter()
            .map(|kind| {
                let markers = markers(kind);
                let chain: Vec<_> = sorted
                    .iter()
                    .filter(|interceptor| interceptor.applies_to(&markers, &capabilities))
                    .cloned()
                    .collect();
                tracing::debug!(
                    entity = E::NAME,
                    operation = %kind,
                    interceptors = ?chain.iter().map(|i| i.name()).collect::<Vec<_>>(),
                    "Built interceptor chain"
                );
                let ctx = CallContext {
                    entity: E::NAME,
                    kind,
                    markers,
                    capabilities,
                };
                (
                    kind,
                    Chain {
                        ctx,
                        interceptors: chain,
                    },
                )
            })
            .collect();

        Self { chains, base }
    }

    /// Run an operation through its chain
    pub async fn execute(&self, operation: Operation<E, D>) -> Result<Output<E, D>> {
        let kind = operation.kind();
        let chain = self
            .chains
            .get(&kind)
            .ok_or_else(|| Error::Internal(format!("no interceptor chain for {}", kind)))?;

        Next {
            interceptors: &chain.interceptors,
            ctx: &chain.ctx,
            base: self.base.as_ref(),
        }
        .run(operation)
        .await
    }

    /// Names of the interceptors wrapping an operation, outermost first
    pub fn interceptor_names(&self, kind: OperationKind) -> Vec<&'static str> {
        self.chains
            .get(&kind)
            .map(|chain| chain.interceptors.iter().map(|i| i.name()).collect())
            .unwrap_or_default()
    }

    /// Context of an operation kind
    pub fn context(&self, kind: OperationKind) -> Option<&CallContext> {
        self.chains.get(&kind).map(|chain| &chain.ctx)
    }
}
