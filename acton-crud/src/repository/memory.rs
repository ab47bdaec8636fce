//! In-memory repository and query engine
//!
//! Rows are stored in document form with every relationship normalised to
//! identifiers. Reads through [`Repository`] return identifier stubs for all
//! relationships; reads through [`QueryEngine`] hydrate exactly the
//! relationships the query join-fetches. Every executed query is recorded.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::{Page, Pagination};
use super::traits::Repository;
use crate::entity::document::{document_id, from_document, id_key, id_stub, to_document, ID_FIELD};
use crate::entity::{Entity, EntityDescriptor, EntityRegistry, FieldKind};
use crate::error::Result;
use crate::fetch::{FetchQuery, QueryEngine, QueryParameter, ROOT_ALIAS};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Value>,
}

impl Table {
    fn position(&self, id: &Value) -> Option<usize> {
        let key = id_key(id);
        self.rows
            .iter()
            .position(|row| document_id(row).is_some_and(|existing| id_key(existing) == key))
    }

    fn get(&self, id: &Value) -> Option<&Value> {
        self.position(id).map(|index| &self.rows[index])
    }
}

/// In-memory store for any set of registered entity types
pub struct MemoryStore {
    registry: Arc<EntityRegistry>,
    tables: RwLock<HashMap<&'static str, Table>>,
    queries: Mutex<Vec<String>>,
    calls: DashMap<RepositoryOperation, usize>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            registry,
            tables: RwLock::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            calls: DashMap::new(),
        }
    }

    /// Text of every query executed so far
    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }

    /// Number of queries executed so far
    pub async fn query_count(&self) -> usize {
        self.queries.lock().await.len()
    }

    /// Forget recorded queries
    pub async fn clear_queries(&self) {
        self.queries.lock().await.clear();
    }

    /// Number of repository calls of the given kind
    pub fn call_count(&self, operation: RepositoryOperation) -> usize {
        self.calls.get(&operation).map_or(0, |count| *count)
    }

    /// Number of stored rows of the named entity
    pub async fn row_count(&self, entity: &str) -> usize {
        self.tables
            .read()
            .await
            .get(entity)
            .map_or(0, |table| table.rows.len())
    }

    /// Store a raw document of a registered entity, returning its identifier
    ///
    /// Relationship targets without an id are stored too.
    pub async fn insert_document(&self, entity: &str, document: Value) -> Result<Value> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut tables = self.tables.write().await;
        self.persist(&mut tables, &descriptor, document)
            .map(|(id, _)| id)
    }

    fn record_call(&self, operation: RepositoryOperation) {
        *self.calls.entry(operation).or_insert(0) += 1;
    }

    // Stores `document` and every relationship target without an id. Returns
    // the identifier of the stored row and the document as saved: the input
    // with generated identifiers filled in.
    fn persist(
        &self,
        tables: &mut HashMap<&'static str, Table>,
        descriptor: &EntityDescriptor,
        document: Value,
    ) -> Result<(Value, Value)> {
        let Value::Object(mut fields) = document else {
            return Err(RepositoryError::validation_failed(format!(
                "{} must serialize to an object",
                descriptor.name()
            ))
            .into());
        };
        let mut saved = fields.clone();

        for field in descriptor.relationships() {
            let Some(target) = field.kind.target() else {
                continue;
            };
            let Some(value) = fields.remove(field.name) else {
                continue;
            };
            let target = self.registry.descriptor(target)?;
            let (normalized, echoed) = match value {
                Value::Array(items) => {
                    let (ids, items): (Vec<_>, Vec<_>) = items
                        .into_iter()
                        .filter(|item| !item.is_null())
                        .map(|item| self.reference(tables, &target, item))
                        .collect::<Result<Vec<_>>>()?
                        .into_iter()
                        .unzip();
                    (Value::Array(ids), Value::Array(items))
                }
                Value::Null => (Value::Null, Value::Null),
                item => self.reference(tables, &target, item)?,
            };
            fields.insert(field.name.to_string(), normalized);
            saved.insert(field.name.to_string(), echoed);
        }

        let table = tables.entry(descriptor.name()).or_default();
        let id = match fields.get(ID_FIELD).filter(|id| !id.is_null()) {
            Some(id) => {
                if let Some(n) = id.as_i64() {
                    table.next_id = table.next_id.max(n);
                }
                id.clone()
            }
            None => {
                table.next_id += 1;
                let id = Value::from(table.next_id);
                fields.insert(ID_FIELD.to_string(), id.clone());
                id
            }
        };
        saved.insert(ID_FIELD.to_string(), id.clone());

        let row = Value::Object(fields);
        match table.position(&id) {
            Some(index) => table.rows[index] = row,
            None => table.rows.push(row),
        }
        Ok((id, Value::Object(saved)))
    }

    // Identifier of a relationship target and its saved form, storing the
    // target first when it has no identifier yet
    fn reference(
        &self,
        tables: &mut HashMap<&'static str, Table>,
        target: &EntityDescriptor,
        item: Value,
    ) -> Result<(Value, Value)> {
        match item {
            Value::Object(_) => match document_id(&item) {
                Some(id) => Ok((id.clone(), item)),
                None => self.persist(tables, target, item),
            },
            id => Ok((id.clone(), id_stub(id))),
        }
    }

    // Row with every relationship replaced by identifier stubs
    fn stubbed(&self, descriptor: &EntityDescriptor, row: &Value) -> Value {
        let mut document = row.clone();
        if let Value::Object(fields) = &mut document {
            for field in descriptor.relationships() {
                if let Some(value) = fields.get_mut(field.name) {
                    *value = stub_references(value.take());
                }
            }
        }
        document
    }

    // Row with the relationships joined under `alias` hydrated, the rest stubbed
    fn hydrate(
        &self,
        tables: &HashMap<&'static str, Table>,
        query: &FetchQuery,
        descriptor: &EntityDescriptor,
        alias: &str,
        row: &Value,
    ) -> Result<Value> {
        let mut document = row.clone();
        let Value::Object(fields) = &mut document else {
            return Ok(document);
        };

        for field in descriptor.relationships() {
            let Some(value) = fields.get_mut(field.name) else {
                continue;
            };
            let (Some(join), Some(target)) = (query.join_for(alias, field.name), field.kind.target())
            else {
                *value = stub_references(value.take());
                continue;
            };

            let target_descriptor = self.registry.descriptor(target)?;
            let table = tables.get(target);
            let mut resolve = |id: Value| -> Result<Value> {
                match table.and_then(|t| t.get(&id)) {
                    Some(target_row) => {
                        self.hydrate(tables, query, &target_descriptor, &join.alias, target_row)
                    }
                    None => Ok(id_stub(id)),
                }
            };

            *value = match (value.take(), field.kind) {
                (Value::Null, _) => Value::Null,
                (Value::Array(ids), FieldKind::ToMany { .. }) => Value::Array(
                    ids.into_iter().map(&mut resolve).collect::<Result<Vec<_>>>()?,
                ),
                (id, _) => resolve(id)?,
            };
        }
        Ok(document)
    }

    async fn record_query(&self, query: &FetchQuery) {
        tracing::trace!(query = %query, "MemoryStore executing query");
        self.queries.lock().await.push(query.text());
    }
}

fn stub_references(value: Value) -> Value {
    match value {
        Value::Array(ids) => Value::Array(ids.into_iter().map(stub_reference).collect()),
        other => stub_reference(other),
    }
}

fn stub_reference(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Object(map) => Value::Object(map),
        id => id_stub(id),
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryStore {
    async fn exists_by_id(&self, id: &E::Id) -> Result<bool> {
        self.record_call(RepositoryOperation::Exists);
        let id = to_document(id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(E::NAME)
            .is_some_and(|table| table.position(&id).is_some()))
    }

    async fn find_by_id(&self, id: &E::Id) -> Result<Option<E>> {
        self.record_call(RepositoryOperation::FindById);
        let descriptor = self.registry.descriptor_of::<E>()?;
        let id = to_document(id)?;
        let tables = self.tables.read().await;
        tables
            .get(E::NAME)
            .and_then(|table| table.get(&id))
            .map(|row| from_document(self.stubbed(&descriptor, row)))
            .transpose()
    }

    async fn find_all(&self, pagination: &Pagination) -> Result<Page<E>> {
        self.record_call(RepositoryOperation::FindAll);
        let descriptor = self.registry.descriptor_of::<E>()?;
        let tables = self.tables.read().await;
        let rows = tables.get(E::NAME).map_or(&[][..], |table| &table.rows[..]);

        let content = page_slice(rows, pagination)
            .iter()
            .map(|row| from_document(self.stubbed(&descriptor, row)))
            .collect::<Result<Vec<E>>>()?;
        Ok(Page::new(content, pagination, rows.len() as u64))
    }

    async fn find_all_ids(&self, pagination: &Pagination) -> Result<Page<E::Id>> {
        self.record_call(RepositoryOperation::FindAllIds);
        let tables = self.tables.read().await;
        let rows = tables.get(E::NAME).map_or(&[][..], |table| &table.rows[..]);

        let content = page_slice(rows, pagination)
            .iter()
            .filter_map(document_id)
            .map(|id| from_document(id.clone()))
            .collect::<Result<Vec<E::Id>>>()?;
        Ok(Page::new(content, pagination, rows.len() as u64))
    }

    async fn save(&self, entity: E) -> Result<E> {
        self.record_call(RepositoryOperation::Save);
        let descriptor = self.registry.descriptor_of::<E>()?;
        let document = to_document(&entity)?;

        let mut tables = self.tables.write().await;
        let (id, saved) = self.persist(&mut tables, &descriptor, document)?;
        tracing::debug!(entity = E::NAME, id = %id, "MemoryStore saved entity");
        from_document(saved)
    }

    async fn delete_by_id(&self, id: &E::Id) -> Result<()> {
        self.record_call(RepositoryOperation::Delete);
        let id = to_document(id)?;
        let mut tables = self.tables.write().await;
        let found = tables
            .get_mut(E::NAME)
            .and_then(|table| table.position(&id).map(|index| table.rows.remove(index)));
        if found.is_none() {
            return Err(RepositoryError::not_found(E::NAME, id.to_string())
                .with_operation(RepositoryOperation::Delete)
                .into());
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.record_call(RepositoryOperation::Delete);
        let mut tables = self.tables.write().await;
        if let Some(table) = tables.get_mut(E::NAME) {
            tracing::debug!(entity = E::NAME, rows = table.rows.len(), "MemoryStore deleting all rows");
            table.rows.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl QueryEngine for MemoryStore {
    async fn fetch_one(&self, query: &FetchQuery) -> Result<Option<Value>> {
        self.record_query(query).await;
        let QueryParameter::Id(id) = &query.parameter else {
            return Err(RepositoryError::query_failed(
                RepositoryOperation::Fetch,
                "single-result query bound to an id list",
            )
            .into());
        };

        let descriptor = self.registry.descriptor(query.entity)?;
        let tables = self.tables.read().await;
        tables
            .get(query.entity)
            .and_then(|table| table.get(id))
            .map(|row| self.hydrate(&tables, query, &descriptor, ROOT_ALIAS, row))
            .transpose()
    }

    async fn fetch_all(&self, query: &FetchQuery) -> Result<Vec<Value>> {
        self.record_query(query).await;
        let ids: Vec<String> = match &query.parameter {
            QueryParameter::Ids(ids) => ids.iter().map(id_key).collect(),
            QueryParameter::Id(id) => vec![id_key(id)],
        };

        let descriptor = self.registry.descriptor(query.entity)?;
        let tables = self.tables.read().await;
        let Some(table) = tables.get(query.entity) else {
            return Ok(Vec::new());
        };

        table
            .rows
            .iter()
            .filter(|row| document_id(row).is_some_and(|id| ids.contains(&id_key(id))))
            .map(|row| self.hydrate(&tables, query, &descriptor, ROOT_ALIAS, row))
            .collect()
    }
}

fn page_slice<'a>(rows: &'a [Value], pagination: &Pagination) -> &'a [Value] {
    let start = usize::try_from(pagination.offset)
        .unwrap_or(usize::MAX)
        .min(rows.len());
    let end = start
        .saturating_add(usize::try_from(pagination.limit).unwrap_or(usize::MAX))
        .min(rows.len());
    &rows[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::repository::RepositoryErrorKind;
    use crate::test_support::{self, department, employee, seed, Department, Employee, Hobby};

    #[tokio::test]
    async fn test_save_cascades_unsaved_targets() {
        let store = MemoryStore::new(test_support::registry());
        let saved = seed(
            &store,
            employee("Ada", Some(department("R&D", &["compiler"])), &["chess", "go"]),
        )
        .await;

        assert_eq!(saved.id, Some(1));
        assert_eq!(store.row_count("Department").await, 1);
        assert_eq!(store.row_count("Company").await, 1);
        assert_eq!(store.row_count("Project").await, 1);
        assert_eq!(store.row_count("Hobby").await, 2);

        // the saved graph comes back with generated ids filled in
        let department = saved.department.unwrap();
        assert_eq!(department.id, Some(1));
        assert_eq!(department.name, "R&D");
        assert_eq!(department.company.unwrap().id, Some(1));
        assert_eq!(
            saved.hobbies.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
    }

    #[tokio::test]
    async fn test_save_keeps_existing_targets() {
        let store = MemoryStore::new(test_support::registry());
        seed(&store, employee("Ada", Some(department("R&D", &[])), &[])).await;

        let reference = Department {
            id: Some(1),
            name: "renamed".to_string(),
            ..Department::default()
        };
        seed(&store, employee("Bob", Some(reference), &[])).await;

        assert_eq!(store.row_count("Department").await, 1);
        let stored = Repository::<Department>::find_by_id(&store, &1).await.unwrap().unwrap();
        assert_eq!(stored.name, "R&D");
    }

    #[tokio::test]
    async fn test_save_with_id_replaces_row() {
        let store = MemoryStore::new(test_support::registry());
        let mut ada = seed(&store, employee("Ada", None, &[])).await;
        ada.name = "Ada L.".to_string();
        Repository::<Employee>::save(&store, ada).await.unwrap();

        assert_eq!(store.row_count("Employee").await, 1);
        let stored = Repository::<Employee>::find_by_id(&store, &1).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada L.");
    }

    #[tokio::test]
    async fn test_find_all_ids_pages() {
        let store = MemoryStore::new(test_support::registry());
        for name in ["a", "b", "c", "d", "e"] {
            Repository::<Hobby>::save(&store, Hobby::named(name)).await.unwrap();
        }

        let page = Repository::<Hobby>::find_all_ids(&store, &Pagination::page(2, 2))
            .await
            .unwrap();
        assert_eq!(page.content, vec![3, 4]);
        assert_eq!(page.total, 5);

        let page = Repository::<Hobby>::find_all(&store, &Pagination::new(4, 10))
            .await
            .unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].name, "e");

        let empty = Repository::<Hobby>::find_all_ids(&store, &Pagination::new(10, 10))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let store = MemoryStore::new(test_support::registry());
        Repository::<Hobby>::save(&store, Hobby::named("chess")).await.unwrap();

        assert!(Repository::<Hobby>::exists_by_id(&store, &1).await.unwrap());
        Repository::<Hobby>::delete_by_id(&store, &1).await.unwrap();
        assert!(!Repository::<Hobby>::exists_by_id(&store, &1).await.unwrap());

        let error = Repository::<Hobby>::delete_by_id(&store, &1).await.unwrap_err();
        match error {
            Error::Repository(e) => {
                assert_eq!(e.kind, RepositoryErrorKind::NotFound);
                assert_eq!(e.operation, RepositoryOperation::Delete);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.call_count(RepositoryOperation::Delete), 2);
        assert_eq!(store.call_count(RepositoryOperation::Save), 1);
    }

    #[tokio::test]
    async fn test_bulk_reads_and_delete_all() {
        let store = MemoryStore::new(test_support::registry());
        let saved = Repository::<Hobby>::save_all(
            &store,
            vec![Hobby::named("chess"), Hobby::named("go")],
        )
        .await
        .unwrap();
        assert_eq!(saved.iter().map(|h| h.id).collect::<Vec<_>>(), vec![Some(1), Some(2)]);

        assert!(Repository::<Hobby>::exists_all_by_id(&store, &[1, 2]).await.unwrap());
        assert!(!Repository::<Hobby>::exists_all_by_id(&store, &[1, 3]).await.unwrap());
        let found = Repository::<Hobby>::find_all_by_id(&store, &[2, 3, 1]).await.unwrap();
        assert_eq!(found.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(), ["go", "chess"]);

        Repository::<Hobby>::delete_all(&store).await.unwrap();
        assert_eq!(store.row_count(Hobby::NAME).await, 0);

        // identifiers are not reused after a delete
        let next = Repository::<Hobby>::save(&store, Hobby::named("poker")).await.unwrap();
        assert_eq!(next.id, Some(3));
    }

    #[tokio::test]
    async fn test_query_engine_hydrates_only_joined_paths() {
        let registry = test_support::registry();
        let store = MemoryStore::new(registry.clone());
        seed(&store, employee("Ada", Some(department("R&D", &["compiler"])), &["chess"])).await;

        let spec = crate::fetch::FetchSpecification {
            entity: "Employee",
            joins: vec![crate::fetch::JoinFetch {
                owner_alias: ROOT_ALIAS.to_string(),
                field: "department",
                alias: "r_1_0".to_string(),
                level: 0,
            }],
            deferred: vec![],
        };
        let row = store
            .fetch_one(&FetchQuery::by_id(&spec, Value::from(1)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(row["department"]["name"], "R&D");
        assert_eq!(row["department"]["company"], serde_json::json!({"id": 1}));
        assert_eq!(row["hobbies"], serde_json::json!([{"id": 1}]));
        assert_eq!(store.query_count().await, 1);

        store.clear_queries().await;
        assert_eq!(store.query_count().await, 0);
    }
}
