//! Query executor
//!
//! Runs the primary query of a [`FetchSpecification`], then resolves deferred
//! relationship paths level by level, collections and to-ones alike. Each level issues one batched query per
//! distinct target type over the identifiers found at all of that type's
//! paths, and stitches the hydrated rows back in place of the identifier
//! stubs. A `(type, id)` pair is queried at most once per call, which bounds
//! the work on cyclic data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::planner::{DeferredPath, FieldPath, FetchSpecification, QueryPlanner};
use super::query::{FetchQuery, QueryEngine};
use crate::entity::document::{document_id, id_key};
use crate::error::Result;

/// Rows already queried in one call, keyed by entity and identifier
///
/// `None` while the row's own deferred paths are still being resolved.
type Materialized = HashMap<(&'static str, String), Option<Value>>;

/// Executes fetch specifications against a query engine
pub struct QueryExecutor<Q: ?Sized> {
    planner: QueryPlanner,
    engine: Arc<Q>,
}

impl<Q: ?Sized> Clone for QueryExecutor<Q> {
    fn clone(&self) -> Self {
        Self {
            planner: self.planner.clone(),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<Q> QueryExecutor<Q>
where
    Q: QueryEngine + ?Sized,
{
    /// Create an executor
    pub fn new(planner: QueryPlanner, engine: Arc<Q>) -> Self {
        Self { planner, engine }
    }

    /// Planner used for every level
    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// Fully hydrate one entity
    pub async fn fetch_by_id(&self, entity: &'static str, id: Value) -> Result<Option<Value>> {
        let mut visited = HashSet::new();
        let spec = self.planner.plan_with(entity, &mut visited)?;
        let query = FetchQuery::by_id(&spec, id.clone());
        tracing::debug!(entity, query = %query, "Executing primary fetch query");

        let Some(row) = self.engine.fetch_one(&query).await? else {
            return Ok(None);
        };

        let mut materialized = Materialized::new();
        materialized.insert((entity, id_key(&id)), None);

        let mut rows = vec![row];
        self.resolve(&spec.deferred, &mut rows, &mut visited, &mut materialized)
            .await?;
        Ok(rows.pop())
    }

    /// Fully hydrate a batch of entities
    ///
    /// Rows follow the order of `ids`, duplicates removed. An empty batch
    /// returns immediately without querying.
    pub async fn fetch_by_ids(&self, entity: &'static str, ids: Vec<Value>) -> Result<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = distinct(ids);

        let mut visited = HashSet::new();
        let spec = self.planner.plan_with(entity, &mut visited)?;
        let query = FetchQuery::by_ids(&spec, ids.clone());
        tracing::debug!(entity, query = %query, "Executing primary fetch query");

        let rows = self.engine.fetch_all(&query).await?;
        let mut rows = order_by_ids(rows, &ids);

        let mut materialized: Materialized =
            ids.iter().map(|id| ((entity, id_key(id)), None)).collect();
        self.resolve(&spec.deferred, &mut rows, &mut visited, &mut materialized)
            .await?;
        Ok(rows)
    }

    /// Plan for a root type, without executing anything
    pub fn plan(&self, entity: &'static str) -> Result<FetchSpecification> {
        self.planner.plan(entity)
    }

    fn resolve<'a>(
        &'a self,
        deferred: &'a [DeferredPath],
        rows: &'a mut [Value],
        visited: &'a mut HashSet<&'static str>,
        materialized: &'a mut Materialized,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            for (target, paths) in group_by_target(deferred) {
                let mut ids = Vec::new();
                let mut seen = HashSet::new();
                for path in &paths {
                    for id in extract_ids(rows, path) {
                        if seen.insert(id_key(&id)) {
                            ids.push(id);
                        }
                    }
                }

                let fresh: Vec<Value> = ids
                    .iter()
                    .filter(|id| !materialized.contains_key(&(target, id_key(id))))
                    .cloned()
                    .collect();

                if !fresh.is_empty() {
                    for id in &fresh {
                        materialized.insert((target, id_key(id)), None);
                    }

                    let spec = self.planner.plan_with(target, visited)?;
                    let query = FetchQuery::by_ids(&spec, fresh);
                    tracing::debug!(
                        entity = target,
                        paths = paths.len(),
                        query = %query,
                        "Executing secondary fetch query for deferred relationship"
                    );

                    let mut fetched = self.engine.fetch_all(&query).await?;
                    self.resolve(&spec.deferred, &mut fetched, visited, materialized)
                        .await?;

                    for row in fetched {
                        if let Some(key) = document_id(&row).map(id_key) {
                            materialized.insert((target, key), Some(row));
                        }
                    }
                }

                let hydrated: HashMap<String, &Value> = ids
                    .iter()
                    .filter_map(|id| {
                        let key = id_key(id);
                        let row = materialized.get(&(target, key.clone()))?.as_ref()?;
                        Some((key, row))
                    })
                    .collect();

                for path in &paths {
                    for row in rows.iter_mut() {
                        stitch(row, path.fields(), &hydrated);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// Identifiers reachable through `path` from every row
///
/// Tolerates `null` at any hop, flattens collections and keeps the first
/// occurrence of each identifier. Never modifies the rows.
pub fn extract_ids(rows: &[Value], path: &FieldPath) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for row in rows {
        collect_ids(row, path.fields(), &mut seen, &mut ids);
    }
    ids
}

fn collect_ids(
    value: &Value,
    fields: &[&'static str],
    seen: &mut HashSet<String>,
    ids: &mut Vec<Value>,
) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                collect_ids(item, fields, seen, ids);
            }
        }
        _ => match fields.split_first() {
            Some((field, rest)) => {
                if let Some(child) = value.get(*field) {
                    collect_ids(child, rest, seen, ids);
                }
            }
            None => {
                if let Some(id) = reference_id(value) {
                    if seen.insert(id_key(id)) {
                        ids.push(id.clone());
                    }
                }
            }
        },
    }
}

fn stitch(value: &mut Value, fields: &[&'static str], hydrated: &HashMap<String, &Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                stitch(item, fields, hydrated);
            }
        }
        Value::Object(map) => {
            let Some((field, rest)) = fields.split_first() else {
                return;
            };
            let Some(child) = map.get_mut(*field) else {
                return;
            };
            if rest.is_empty() {
                replace_stubs(child, hydrated);
            } else {
                stitch(child, rest, hydrated);
            }
        }
        _ => {}
    }
}

fn replace_stubs(value: &mut Value, hydrated: &HashMap<String, &Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                replace_stub(item, hydrated);
            }
        }
        Value::Null => {}
        other => replace_stub(other, hydrated),
    }
}

fn replace_stub(item: &mut Value, hydrated: &HashMap<String, &Value>) {
    let replacement = reference_id(item)
        .and_then(|id| hydrated.get(&id_key(id)))
        .map(|row| (*row).clone());
    if let Some(row) = replacement {
        *item = row;
    }
}

// A reference is either a stub/entity object or a bare identifier
fn reference_id(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(_) => document_id(value),
        Value::Null | Value::Array(_) => None,
        other => Some(other),
    }
}

fn group_by_target(deferred: &[DeferredPath]) -> Vec<(&'static str, Vec<&FieldPath>)> {
    let mut groups: Vec<(&'static str, Vec<&FieldPath>)> = Vec::new();
    for entry in deferred {
        match groups.iter_mut().find(|(target, _)| *target == entry.target) {
            Some((_, paths)) => paths.push(&entry.path),
            None => groups.push((entry.target, vec![&entry.path])),
        }
    }
    groups
}

fn distinct(ids: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id_key(id))).collect()
}

fn order_by_ids(rows: Vec<Value>, ids: &[Value]) -> Vec<Value> {
    let mut by_id: HashMap<String, Value> = HashMap::with_capacity(rows.len());
    for row in rows {
        if let Some(key) = document_id(&row).map(id_key) {
            by_id.entry(key).or_insert(row);
        }
    }
    ids.iter().filter_map(|id| by_id.remove(&id_key(id))).collect()
}
