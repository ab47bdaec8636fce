//! Relationship-graph query planner
//!
//! Planning walks the relationship graph of an entity type breadth first,
//! frame by frame. Every field of a frame is classified before any joined
//! child frame is expanded, so the field that wins the single collection join
//! is always the first to-many in declaration order at the shallowest level.
//! The join text is produced in the same breadth-first order, level by level
//! rather than depth first: every join owned by the root precedes the joins
//! of its targets.
//!
//! Rules applied per field:
//!
//! - plain values are skipped
//! - a relationship whose target was already traversed is deferred, to-one
//!   and to-many alike
//! - a to-one is joined and its target traversed
//! - the first to-many of the whole query is joined and traversed; every
//!   later one is deferred

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::config::FetchConfig;
use crate::entity::{EntityRegistry, FieldDescriptor, FieldKind, RelationKind, Traversal};
use crate::error::Result;

/// Alias of the root entity in generated queries
pub const ROOT_ALIAS: &str = "e";

/// One `LEFT JOIN FETCH` clause
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinFetch {
    /// Alias of the entity owning the field
    pub owner_alias: String,
    /// Joined field
    pub field: &'static str,
    /// Alias given to the joined target
    pub alias: String,
    /// Traversal depth of the owner, the root being 0
    pub level: usize,
}

impl fmt::Display for JoinFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEFT JOIN FETCH {}.{} {}",
            self.owner_alias, self.field, self.alias
        )
    }
}

/// Field names leading from a root entity to a relationship field
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    fields: Vec<&'static str>,
}

impl FieldPath {
    /// Path of the root itself
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from field names
    pub fn new(fields: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Extend the path by one field
    #[must_use]
    pub fn child(&self, field: &'static str) -> Self {
        let mut fields = self.fields.clone();
        fields.push(field);
        Self { fields }
    }

    /// Field names, root first
    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.join("."))
    }
}

/// A relationship loaded after the primary query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeferredPath {
    /// Target entity, the element entity for a collection
    pub target: &'static str,
    /// Path from the root to the relationship field
    pub path: FieldPath,
}

/// Join clauses plus deferred paths for one root entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSpecification {
    /// Root entity name
    pub entity: &'static str,
    /// Join clauses in generation order
    pub joins: Vec<JoinFetch>,
    /// Relationships resolved by secondary queries
    pub deferred: Vec<DeferredPath>,
}

impl FetchSpecification {
    /// Rendered join clauses, each prefixed by a space
    pub fn join_clause(&self) -> String {
        self.joins.iter().map(|join| format!(" {}", join)).collect()
    }
}

struct Frame {
    alias: String,
    entity: &'static str,
    level: usize,
    path: FieldPath,
}

/// Builds fetch specifications from registered entity descriptors
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    registry: Arc<EntityRegistry>,
    join_many_to_many: bool,
}

impl QueryPlanner {
    /// Create a planner with default settings
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self::with_config(registry, &FetchConfig::default())
    }

    /// Create a planner from configuration
    pub fn with_config(registry: Arc<EntityRegistry>, config: &FetchConfig) -> Self {
        Self {
            registry,
            join_many_to_many: config.join_many_to_many,
        }
    }

    /// Registry the planner reads descriptors from
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Plan the primary query for `root`
    pub fn plan(&self, root: &'static str) -> Result<FetchSpecification> {
        let mut visited = HashSet::new();
        self.plan_with(root, &mut visited)
    }

    /// Plan `root` against a visited set shared with earlier plans
    ///
    /// Every type traversed by this plan is added to `visited`.
    pub fn plan_with(
        &self,
        root: &'static str,
        visited: &mut HashSet<&'static str>,
    ) -> Result<FetchSpecification> {
        visited.insert(root);

        let mut joins = Vec::new();
        let mut deferred = Vec::new();
        let mut aliases = HashSet::new();
        let mut many_joined = false;

        let mut frames = VecDeque::from([Frame {
            alias: ROOT_ALIAS.to_string(),
            entity: root,
            level: 0,
            path: FieldPath::root(),
        }]);

        while let Some(frame) = frames.pop_front() {
            let descriptor = self.registry.descriptor(frame.entity)?;

            for field in descriptor.fields() {
                // Classified when reached, so a target joined by an earlier
                // sibling already counts as visited
                let target = match field.traversal(visited) {
                    Traversal::Terminal => continue,
                    Traversal::ClosingOne { target } | Traversal::ClosingMany { target } => {
                        deferred.push(DeferredPath {
                            target,
                            path: frame.path.child(field.name),
                        });
                        continue;
                    }
                    Traversal::ToOne { target } => target,
                    Traversal::ToMany { target } => {
                        if many_joined || !self.joinable_many(field) {
                            deferred.push(DeferredPath {
                                target,
                                path: frame.path.child(field.name),
                            });
                            continue;
                        }
                        many_joined = true;
                        target
                    }
                };

                let alias = unique_alias(&mut aliases, field.index, frame.level);
                joins.push(JoinFetch {
                    owner_alias: frame.alias.clone(),
                    field: field.name,
                    alias: alias.clone(),
                    level: frame.level,
                });
                visited.insert(target);
                frames.push_back(Frame {
                    alias,
                    entity: target,
                    level: frame.level + 1,
                    path: frame.path.child(field.name),
                });
            }
        }

        let spec = FetchSpecification {
            entity: root,
            joins,
            deferred,
        };
        tracing::trace!(
            entity = root,
            joins = spec.joins.len(),
            deferred = spec.deferred.len(),
            "Planned eager fetch"
        );
        Ok(spec)
    }

    fn joinable_many(&self, field: &FieldDescriptor) -> bool {
        self.join_many_to_many
            || !matches!(
                field.kind,
                FieldKind::ToMany {
                    relation: RelationKind::ManyToMany,
                    ..
                }
            )
    }
}

fn unique_alias(aliases: &mut HashSet<String>, index: usize, level: usize) -> String {
    let base = format!("r_{}_{}", index, level);
    if aliases.insert(base.clone()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if aliases.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
