//! CRUD service: typed entry points over the interception pipeline
//!
//! A [`CrudService`] is assembled once by [`CrudServiceBuilder`]. At build time
//! it computes the service [`Capabilities`], installs the standard behaviors
//! and builds one interceptor chain per operation; nothing is re-evaluated per call.
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::new(registry.clone()));
//! let service = CrudService::<Employee>::builder(store.clone())
//!     .registry(registry.clone())
//!     .fetch_relationships(Arc::new(EagerFetchRepository::new(store, registry)))
//!     .cache(Arc::new(MemoryCacheStore::new()))
//!     .loggable(true)
//!     .build()?;
//!
//! let employee = service.find_by_id(&7).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::CacheStore;
use crate::capability::Capabilities;
use crate::config::{CacheConfig, Config, FetchConfig, LoggingConfig};
use crate::entity::document::{document_id, from_document, to_document};
use crate::entity::{Entity, EntityRegistry, Presentation};
use crate::error::{Error, Result};
use crate::interceptors::{
    CachingInterceptor, LoggingInterceptor, MappingInterceptor, RelationshipInterceptor,
    SaveRelationshipInterceptor,
};
use crate::mapper::Mapper;
use crate::pipeline::{
    BaseOperation, CacheMarker, Interceptor, Operation, OperationKind, OperationMarkers, Output,
    Patch, PatchForm, Pipeline, Record,
};
use crate::repository::{FetchRelationshipRepository, Page, Pagination, Repository};

/// CRUD operations of one entity type
///
/// `D` is the transfer form exchanged with callers; it defaults to the entity
/// itself when no mapper is attached.
pub struct CrudService<E: Entity, D: Presentation = E> {
    pipeline: Pipeline<E, D>,
    capabilities: Capabilities,
}

impl<E: Entity, D: Presentation> fmt::Debug for CrudService<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudService")
            .field("entity", &E::NAME)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<E: Entity, D: Presentation> CrudService<E, D> {
    /// Start building a service over `repository`
    pub fn builder(repository: Arc<dyn Repository<E>>) -> CrudServiceBuilder<E, D> {
        CrudServiceBuilder::new(repository)
    }

    /// Capabilities computed at build time
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Interceptor chains of this service
    pub fn pipeline(&self) -> &Pipeline<E, D> {
        &self.pipeline
    }

    /// Run any operation through its chain
    pub async fn execute(&self, operation: Operation<E, D>) -> Result<Output<E, D>> {
        self.pipeline.execute(operation).await
    }

    /// One page of records
    pub async fn find_all(&self, pagination: Pagination) -> Result<Page<Record<E, D>>> {
        match self.execute(Operation::FindAll(pagination)).await? {
            Output::Page(page) => Ok(page),
            other => Err(unexpected(OperationKind::FindAll, &other)),
        }
    }

    /// One record by id
    pub async fn find_by_id(&self, id: &E::Id) -> Result<Record<E, D>> {
        let output = self.execute(Operation::FindById(id.clone())).await?;
        into_record(OperationKind::FindById, output)
    }

    /// Create a record that has no id yet
    pub async fn save(&self, data: Record<E, D>) -> Result<Record<E, D>> {
        let output = self.execute(Operation::Save(data)).await?;
        into_record(OperationKind::Save, output)
    }

    /// Replace the record stored under `id`
    pub async fn update_by_id(&self, id: &E::Id, data: Record<E, D>) -> Result<Record<E, D>> {
        let output = self.execute(Operation::UpdateById(id.clone(), data)).await?;
        into_record(OperationKind::UpdateById, output)
    }

    /// Merge the non-null sent fields of `patch` into the record stored under `id`
    pub async fn patch_by_id(&self, id: &E::Id, patch: Patch) -> Result<Record<E, D>> {
        let output = self.execute(Operation::PatchById(id.clone(), patch)).await?;
        into_record(OperationKind::PatchById, output)
    }

    /// Delete the record stored under `id`
    pub async fn delete_by_id(&self, id: &E::Id) -> Result<()> {
        self.execute(Operation::DeleteById(id.clone())).await?;
        Ok(())
    }

    /// Create records that have no id yet
    pub async fn save_all(&self, datas: Vec<Record<E, D>>) -> Result<Vec<Record<E, D>>> {
        let output = self.execute(Operation::SaveAll(datas)).await?;
        into_records(OperationKind::SaveAll, output)
    }

    /// Replace every record, each identified by its own id
    pub async fn update_all(&self, datas: Vec<Record<E, D>>) -> Result<Vec<Record<E, D>>> {
        let output = self.execute(Operation::UpdateAll(datas)).await?;
        into_records(OperationKind::UpdateAll, output)
    }

    /// Partially update every record, each identified by its own id
    pub async fn patch_all(&self, patches: Vec<Patch>) -> Result<Vec<Record<E, D>>> {
        let output = self.execute(Operation::PatchAll(patches)).await?;
        into_records(OperationKind::PatchAll, output)
    }

    /// Delete every record
    pub async fn delete_all(&self) -> Result<()> {
        self.execute(Operation::DeleteAll).await?;
        Ok(())
    }

    /// Read a request body into the form the service expects
    ///
    /// The transfer form when a mapper is attached, the entity otherwise.
    pub fn record_from(&self, body: Value) -> Result<Record<E, D>> {
        let invalid = |e: Error| Error::BadRequest(format!("Invalid {} payload: {}", E::NAME, e));
        if self.capabilities.mappable {
            from_document(body).map(Record::Dto).map_err(invalid)
        } else {
            from_document(body).map(Record::Entity).map_err(invalid)
        }
    }

    /// Read a JSON array body into records
    pub fn records_from(&self, body: Value) -> Result<Vec<Record<E, D>>> {
        let Value::Array(items) = body else {
            return Err(Error::BadRequest(format!(
                "Invalid {} payload: expected an array",
                E::NAME
            )));
        };
        items.into_iter().map(|item| self.record_from(item)).collect()
    }

    /// Read a partial update body, keeping only the fields it names
    pub fn patch_from(&self, body: Value) -> Result<Patch> {
        let form = if self.capabilities.mappable {
            PatchForm::Dto
        } else {
            PatchForm::Entity
        };
        Patch::from_value(body, form)
            .ok_or_else(|| Error::BadRequest(format!("Cannot partial update : {}", E::NAME)))
    }

    /// Read a JSON array of partial update bodies
    pub fn patches_from(&self, body: Value) -> Result<Vec<Patch>> {
        let Value::Array(items) = body else {
            return Err(Error::BadRequest(format!(
                "Invalid {} payload: expected an array",
                E::NAME
            )));
        };
        items.into_iter().map(|item| self.patch_from(item)).collect()
    }
}

fn unexpected<E: Presentation, D: Presentation>(kind: OperationKind, output: &Output<E, D>) -> Error {
    let shape = match output {
        Output::Record(_) => "a record",
        Output::Page(_) => "a page",
        Output::List(_) => "a list",
        Output::Empty => "nothing",
    };
    Error::Internal(format!("{} returned {}", kind, shape))
}

fn into_record<E: Presentation, D: Presentation>(
    kind: OperationKind,
    output: Output<E, D>,
) -> Result<Record<E, D>> {
    match output {
        Output::Record(record) => Ok(record),
        other => Err(unexpected(kind, &other)),
    }
}

fn into_records<E: Presentation, D: Presentation>(
    kind: OperationKind,
    output: Output<E, D>,
) -> Result<Vec<Record<E, D>>> {
    match output {
        Output::List(records) => Ok(records),
        other => Err(unexpected(kind, &other)),
    }
}

/// Builder for [`CrudService`]
pub struct CrudServiceBuilder<E: Entity, D: Presentation> {
    repository: Arc<dyn Repository<E>>,
    fetch: Option<Arc<dyn FetchRelationshipRepository<E>>>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_names: Vec<String>,
    mapper: Option<Arc<dyn Mapper<E, D>>>,
    loggable: bool,
    registry: Option<Arc<EntityRegistry>>,
    markers: HashMap<OperationKind, OperationMarkers>,
    interceptors: Vec<Arc<dyn Interceptor<E, D>>>,
    fetch_config: FetchConfig,
    cache_config: CacheConfig,
    logging_config: LoggingConfig,
}

impl<E: Entity, D: Presentation> CrudServiceBuilder<E, D> {
    fn new(repository: Arc<dyn Repository<E>>) -> Self {
        Self {
            repository,
            fetch: None,
            cache: None,
            cache_names: vec![E::NAME.to_string()],
            mapper: None,
            loggable: false,
            registry: None,
            markers: HashMap::new(),
            interceptors: Vec::new(),
            fetch_config: FetchConfig::default(),
            cache_config: CacheConfig::default(),
            logging_config: LoggingConfig::default(),
        }
    }

    /// Hydrate relationships on reads
    pub fn fetch_relationships(mut self, fetch: Arc<dyn FetchRelationshipRepository<E>>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Cache results in `store`
    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Default cache names, the entity name unless set
    pub fn cache_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Convert between the entity and its transfer form
    pub fn mapper(mut self, mapper: Arc<dyn Mapper<E, D>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Log every call
    pub fn loggable(mut self, loggable: bool) -> Self {
        self.loggable = loggable;
        self
    }

    /// Registry holding the entity graph, the process-wide one unless set
    pub fn registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the markers of one operation
    pub fn markers(mut self, kind: OperationKind, markers: OperationMarkers) -> Self {
        self.markers.insert(kind, markers);
        self
    }

    /// Add a custom behavior
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor<E, D>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Apply fetch, cache and logging configuration
    pub fn config(mut self, config: &Config) -> Self {
        self.fetch_config = config.fetch.clone();
        self.cache_config = config.cache.clone();
        self.logging_config = config.logging.clone();
        self
    }

    fn markers_of(&self, kind: OperationKind) -> OperationMarkers {
        if let Some(markers) = self.markers.get(&kind) {
            return markers.clone();
        }
        let markers = OperationMarkers::defaults(kind);
        if kind == OperationKind::FindAll {
            let caching = CacheMarker::caching().suffix(self.cache_config.all_suffix.as_str());
            return markers.with_caching(Some(caching));
        }
        markers
    }

    /// Compute capabilities and build every interceptor chain
    pub fn build(self) -> Result<CrudService<E, D>> {
        let registry = self.registry.clone().unwrap_or_else(EntityRegistry::global);
        let descriptor = registry.descriptor_of::<E>()?;

        let fetch = self.fetch.clone().filter(|_| self.fetch_config.enabled);
        let cache = self.cache.clone().filter(|_| self.cache_config.enabled);

        let capabilities = Capabilities {
            fetch_relationships: fetch.is_some(),
            cacheable: cache.is_some(),
            mappable: self.mapper.is_some(),
            loggable: self.loggable,
            relationship_bearing: descriptor.has_relationships(),
        };

        let mut interceptors: Vec<Arc<dyn Interceptor<E, D>>> = vec![
            Arc::new(LoggingInterceptor::with_config(&self.logging_config)),
            Arc::new(SaveRelationshipInterceptor::new(registry.clone())),
        ];
        if let Some(store) = &cache {
            interceptors.push(Arc::new(CachingInterceptor::with_config(
                store.clone(),
                self.cache_names.clone(),
                &self.cache_config,
            )));
        }
        if let Some(mapper) = &self.mapper {
            interceptors.push(Arc::new(MappingInterceptor::new(mapper.clone())));
        }
        if let Some(fetch) = &fetch {
            interceptors.push(Arc::new(RelationshipInterceptor::new(
                self.repository.clone(),
                fetch.clone(),
            )));
        }
        interceptors.extend(self.interceptors.iter().cloned());

        let base = Arc::new(BaseService {
            repository: self.repository.clone(),
            fetch,
        });

        tracing::debug!(entity = E::NAME, ?capabilities, "Building CRUD service");

        let pipeline = Pipeline::new(
            interceptors,
            |kind| self.markers_of(kind),
            capabilities,
            base,
        );

        Ok(CrudService {
            pipeline,
            capabilities,
        })
    }
}

/// Default behavior at the end of every chain
struct BaseService<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    fetch: Option<Arc<dyn FetchRelationshipRepository<E>>>,
}

impl<E: Entity> BaseService<E> {
    fn entity_of<D: Presentation>(record: Record<E, D>, action: &str) -> Result<E> {
        record.into_entity().ok_or_else(|| {
            Error::BadRequest(format!(
                "Can't {} when the provided object is not an entity : {}",
                action,
                E::NAME
            ))
        })
    }

    fn missing_id(action: &str) -> Error {
        Error::BadRequest(format!(
            "Can't {} an entity when they don't have an ID : {}",
            action,
            E::NAME
        ))
    }

    // Payload id, which must be present and equal to the path id.
    fn checked_id(data_id: Option<&Value>, id: &E::Id, action: &str) -> Result<()> {
        let data_id = data_id.ok_or_else(|| Self::missing_id(action))?;
        if *data_id != to_document(id)? {
            return Err(Error::BadRequest(format!(
                "Can't {} an entity when different ID are provided : {}",
                action,
                E::NAME
            )));
        }
        Ok(())
    }

    fn parsed_id(data_id: Option<&Value>, action: &str) -> Result<E::Id> {
        let data_id = data_id.ok_or_else(|| Self::missing_id(action))?;
        from_document(data_id.clone())
            .map_err(|e| Error::BadRequest(format!("Invalid {} id: {}", E::NAME, e)))
    }

    async fn stored(&self, id: &E::Id) -> Result<E> {
        let found = match &self.fetch {
            Some(fetch) => fetch.find_by_id_eager_relationship(id).await?,
            None => self.repository.find_by_id(id).await?,
        };
        found.ok_or_else(|| Error::entity_not_found(E::NAME, id))
    }

    fn merged(stored: &E, patch: &Patch) -> Result<E> {
        let mut document = to_document(stored)?;
        patch.apply_to(&mut document);
        from_document(document).map_err(|e| {
            tracing::debug!(entity = E::NAME, "Partial update failed: {}", e);
            Error::BadRequest(format!("Cannot partial update : {}", E::NAME))
        })
    }

    async fn patch(&self, id: E::Id, patch: Patch) -> Result<E> {
        Self::checked_id(patch.id(), &id, "partially update")?;
        let stored = self.stored(&id).await?;
        let entity = Self::merged(&stored, &patch)?;
        self.repository.save(entity).await
    }

    async fn save_all<D: Presentation>(&self, datas: Vec<Record<E, D>>) -> Result<Vec<E>> {
        for data in &datas {
            if document_id(&data.to_document()?).is_some() {
                return Err(Error::BadRequest(format!(
                    "Can't save an entity when already have an ID : {}",
                    E::NAME
                )));
            }
        }
        let entities = datas
            .into_iter()
            .map(|data| Self::entity_of(data, "save"))
            .collect::<Result<Vec<_>>>()?;
        self.repository.save_all(entities).await
    }

    async fn update_all<D: Presentation>(&self, datas: Vec<Record<E, D>>) -> Result<Vec<E>> {
        let entities = datas
            .into_iter()
            .map(|data| Self::entity_of(data, "update"))
            .collect::<Result<Vec<_>>>()?;

        let mut ids: Vec<E::Id> = Vec::with_capacity(entities.len());
        for entity in &entities {
            let id = entity.id().ok_or_else(|| Self::missing_id("update"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.len() != entities.len() || !self.repository.exists_all_by_id(&ids).await? {
            return Err(Error::NotFound(E::NAME.to_string()));
        }
        self.repository.save_all(entities).await
    }

    async fn patch_all(&self, patches: Vec<Patch>) -> Result<Vec<E>> {
        let ids = patches
            .iter()
            .map(|patch| Self::parsed_id(patch.id(), "partially update"))
            .collect::<Result<Vec<_>>>()?;

        let stored = match &self.fetch {
            Some(fetch) => fetch.find_all_eager_relationship(&ids).await?,
            None => self.repository.find_all_by_id(&ids).await?,
        };
        if stored.len() != patches.len() {
            return Err(Error::NotFound(E::NAME.to_string()));
        }

        let mut merged = Vec::with_capacity(patches.len());
        for (patch, id) in patches.iter().zip(&ids) {
            let current = stored
                .iter()
                .find(|entity| entity.id().as_ref() == Some(id))
                .ok_or_else(|| Error::entity_not_found(E::NAME, id))?;
            merged.push(Self::merged(current, patch)?);
        }
        self.repository.save_all(merged).await
    }
}

#[async_trait]
impl<E: Entity, D: Presentation> BaseOperation<E, D> for BaseService<E> {
    async fn execute(&self, operation: Operation<E, D>) -> Result<Output<E, D>> {
        let entity = match operation {
            Operation::FindAll(pagination) => {
                let page = self.repository.find_all(&pagination).await?;
                return Ok(Output::Page(page.map(Record::Entity)));
            }
            Operation::FindById(id) => self
                .repository
                .find_by_id(&id)
                .await?
                .ok_or_else(|| Error::entity_not_found(E::NAME, &id))?,
            Operation::Save(data) => {
                if document_id(&data.to_document()?).is_some() {
                    return Err(Error::BadRequest(format!(
                        "Can't save an entity when already have an ID : {}",
                        E::NAME
                    )));
                }
                let entity = Self::entity_of(data, "save")?;
                self.repository.save(entity).await?
            }
            Operation::UpdateById(id, data) => {
                let entity = Self::entity_of(data, "update")?;
                let document = to_document(&entity)?;
                Self::checked_id(document_id(&document), &id, "update")?;
                if !self.repository.exists_by_id(&id).await? {
                    return Err(Error::entity_not_found(E::NAME, &id));
                }
                self.repository.save(entity).await?
            }
            Operation::PatchById(id, patch) => self.patch(id, patch).await?,
            Operation::DeleteById(id) => {
                if !self.repository.exists_by_id(&id).await? {
                    return Err(Error::entity_not_found(E::NAME, &id));
                }
                self.repository.delete_by_id(&id).await?;
                return Ok(Output::Empty);
            }
            Operation::SaveAll(datas) => return Ok(list(self.save_all(datas).await?)),
            Operation::UpdateAll(datas) => return Ok(list(self.update_all(datas).await?)),
            Operation::PatchAll(patches) => return Ok(list(self.patch_all(patches).await?)),
            Operation::DeleteAll => {
                self.repository.delete_all().await?;
                return Ok(Output::Empty);
            }
        };
        Ok(Output::Record(Record::Entity(entity)))
    }
}

fn list<E: Presentation, D: Presentation>(entities: Vec<E>) -> Output<E, D> {
    Output::List(entities.into_iter().map(Record::Entity).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::fetch::EagerFetchRepository;
    use crate::repository::{MemoryStore, RepositoryOperation};
    use crate::test_support::{self, Department, Employee, EmployeeDto, EmployeeMapper, Hobby};
    use serde_json::json;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(test_support::registry()))
    }

    fn plain(store: &Arc<MemoryStore>) -> CrudService<Employee> {
        CrudService::<Employee>::builder(store.clone())
            .registry(test_support::registry())
            .build()
            .unwrap()
    }

    fn full(store: &Arc<MemoryStore>, cache: Arc<MemoryCacheStore>) -> CrudService<Employee> {
        let registry = test_support::registry();
        CrudService::<Employee>::builder(store.clone())
            .registry(registry.clone())
            .fetch_relationships(Arc::new(EagerFetchRepository::new(store.clone(), registry)))
            .cache(cache)
            .loggable(true)
            .build()
            .unwrap()
    }

    fn entity(record: Record<Employee, Employee>) -> Employee {
        record.into_entity().unwrap()
    }

    #[test]
    fn test_capabilities_and_chains() {
        let store = store();
        let service = full(&store, Arc::new(MemoryCacheStore::new()));

        let capabilities = service.capabilities();
        assert!(capabilities.fetch_relationships);
        assert!(capabilities.cacheable);
        assert!(!capabilities.mappable);
        assert!(capabilities.relationship_bearing);

        assert_eq!(
            service.pipeline().interceptor_names(OperationKind::FindById),
            vec!["Logging", "Caching", "Relationship"]
        );
        assert_eq!(
            service.pipeline().interceptor_names(OperationKind::Save),
            vec!["Logging", "Caching", "SaveRelationship"]
        );
        assert_eq!(
            service.pipeline().interceptor_names(OperationKind::DeleteById),
            vec!["Logging", "Caching"]
        );
    }

    #[test]
    fn test_disabled_by_config() {
        let store = store();
        let mut config = Config::default();
        config.fetch.enabled = false;
        config.cache.enabled = false;

        let registry = test_support::registry();
        let service = CrudService::<Employee>::builder(store.clone())
            .registry(registry.clone())
            .fetch_relationships(Arc::new(EagerFetchRepository::new(store, registry)))
            .cache(Arc::new(MemoryCacheStore::new()))
            .config(&config)
            .build()
            .unwrap();

        assert!(!service.capabilities().fetch_relationships);
        assert!(!service.capabilities().cacheable);
        assert!(service
            .pipeline()
            .interceptor_names(OperationKind::FindById)
            .is_empty());
    }

    #[tokio::test]
    async fn test_save_then_find_hydrated() {
        let store = store();
        let service = full(&store, Arc::new(MemoryCacheStore::new()));

        let saved = entity(
            service
                .save(Record::Entity(test_support::employee(
                    "ada",
                    Some(test_support::department("R&D", &["apollo"])),
                    &["chess", "go"],
                )))
                .await
                .unwrap(),
        );
        let id = saved.id.unwrap();

        let found = entity(service.find_by_id(&id).await.unwrap());
        assert_eq!(found.name, "ada");
        assert_eq!(found.hobbies.len(), 2);
        let department = found.department.unwrap();
        assert_eq!(department.projects[0].name, "apollo");
        assert_eq!(department.manager.unwrap().name, "R&D lead");
    }

    #[tokio::test]
    async fn test_save_with_id_rejected() {
        let store = store();
        let service = plain(&store);

        let err = service
            .save(Record::Entity(Employee {
                id: Some(3),
                ..Employee::default()
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't save an entity when already have an ID : Employee"));
    }

    #[tokio::test]
    async fn test_save_with_relationship_id_never_reaches_repository() {
        let store = store();
        let service = plain(&store);

        let err = service
            .save(Record::Entity(Employee {
                name: "ada".to_string(),
                department: Some(Department {
                    id: Some(1),
                    ..Department::default()
                }),
                ..Employee::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(store.call_count(RepositoryOperation::Save), 0);
    }

    #[tokio::test]
    async fn test_update_checks() {
        let store = store();
        let service = plain(&store);
        let saved = test_support::seed(&store, test_support::employee("ada", None, &[])).await;
        let id = saved.id.unwrap();

        let err = service
            .update_by_id(&id, Record::Entity(Employee::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't update an entity when they don't have an ID : Employee"));

        let err = service
            .update_by_id(
                &id,
                Record::Entity(Employee {
                    id: Some(id + 1),
                    ..Employee::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't update an entity when different ID are provided : Employee"));

        let err = service
            .update_by_id(
                &99,
                Record::Entity(Employee {
                    id: Some(99),
                    ..Employee::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let updated = entity(
            service
                .update_by_id(
                    &id,
                    Record::Entity(Employee {
                        id: Some(id),
                        name: "grace".to_string(),
                        ..Employee::default()
                    }),
                )
                .await
                .unwrap(),
        );
        assert_eq!(updated.name, "grace");
    }

    #[tokio::test]
    async fn test_patch_keeps_fields_absent_from_body() {
        let store = store();
        let service = full(&store, Arc::new(MemoryCacheStore::new()));
        let saved = test_support::seed(
            &store,
            test_support::employee(
                "ada",
                Some(test_support::department("R&D", &[])),
                &["chess"],
            ),
        )
        .await;
        let id = saved.id.unwrap();

        let patch = service.patch_from(json!({"id": id, "name": "grace"})).unwrap();
        let patched = entity(service.patch_by_id(&id, patch).await.unwrap());
        assert_eq!(patched.name, "grace");
        assert_eq!(patched.department.unwrap().name, "R&D");
        assert_eq!(patched.hobbies.len(), 1);
        assert_eq!(patched.hobbies[0].name, "chess");

        let patch = service
            .patch_from(json!({"id": id, "hobbies": [{"name": "go"}]}))
            .unwrap();
        let patched = entity(service.patch_by_id(&id, patch).await.unwrap());
        assert_eq!(patched.name, "grace");
        assert_eq!(patched.hobbies.len(), 1);
        assert_eq!(patched.hobbies[0].name, "go");

        let stored = entity(service.find_by_id(&id).await.unwrap());
        assert_eq!(stored.name, "grace");
        assert_eq!(stored.hobbies[0].name, "go");
    }

    #[tokio::test]
    async fn test_patch_null_keeps_value_and_empty_list_clears() {
        let store = store();
        let service = plain(&store);
        let saved = test_support::seed(&store, test_support::employee("ada", None, &["chess"])).await;
        let id = saved.id.unwrap();

        let patch = service
            .patch_from(json!({"id": id, "name": null, "hobbies": []}))
            .unwrap();
        let patched = entity(service.patch_by_id(&id, patch).await.unwrap());
        assert_eq!(patched.name, "ada");
        assert!(patched.hobbies.is_empty());
    }

    #[tokio::test]
    async fn test_patch_checks() {
        let store = store();
        let service = plain(&store);

        let err = service
            .patch_by_id(&5, service.patch_from(json!({"id": 5})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = service
            .patch_by_id(&5, service.patch_from(json!({"name": "x"})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't partially update an entity when they don't have an ID : Employee"));

        let err = service.patch_from(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Cannot partial update : Employee"));

        let saved = test_support::seed(&store, test_support::employee("ada", None, &[])).await;
        let id = saved.id.unwrap();
        let err = service
            .patch_by_id(&id, service.patch_from(json!({"id": id, "name": 5})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Cannot partial update : Employee"));
    }

    #[tokio::test]
    async fn test_mapped_patch_renames_dto_fields() {
        let store = store();
        let registry = test_support::registry();
        let service = CrudService::<Employee, EmployeeDto>::builder(store.clone())
            .registry(registry.clone())
            .fetch_relationships(Arc::new(EagerFetchRepository::new(store.clone(), registry)))
            .mapper(Arc::new(EmployeeMapper))
            .build()
            .unwrap();
        let saved = test_support::seed(
            &store,
            test_support::employee("ada", Some(test_support::department("R&D", &[])), &["chess"]),
        )
        .await;
        let id = saved.id.unwrap();

        let patch = service.patch_from(json!({"id": id, "hobbies": ["go"]})).unwrap();
        assert_eq!(patch.form, PatchForm::Dto);
        let patched = service
            .patch_by_id(&id, patch)
            .await
            .unwrap()
            .into_dto()
            .unwrap();

        assert_eq!(patched.name, "ada");
        assert_eq!(patched.department_id, saved.department.and_then(|d| d.id));
        assert_eq!(patched.hobbies, vec!["go".to_string()]);
    }

    #[tokio::test]
    async fn test_reads_without_fetch_capability_match_repository() {
        let store = store();
        let saved = test_support::seed(
            &store,
            test_support::employee(
                "ada",
                Some(test_support::department("R&D", &["apollo"])),
                &["chess", "go"],
            ),
        )
        .await;
        test_support::seed(&store, test_support::employee("grace", None, &["poker"])).await;
        let id = saved.id.unwrap();
        let service = plain(&store);
        assert!(!service.capabilities().fetch_relationships);

        let found = entity(service.find_by_id(&id).await.unwrap());
        let direct = Repository::<Employee>::find_by_id(store.as_ref(), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, direct);
        assert_eq!(found.department.as_ref().unwrap().name, "");

        let pagination = Pagination::page(1, 10);
        let page = service.find_all(pagination.clone()).await.unwrap();
        let direct = Repository::<Employee>::find_all(store.as_ref(), &pagination)
            .await
            .unwrap();
        assert_eq!(page.map(entity), direct);
        assert_eq!(store.query_count().await, 0);
    }

    #[tokio::test]
    async fn test_save_all_and_reject_ids() {
        let store = store();
        let cache = Arc::new(MemoryCacheStore::new());
        let service = full(&store, cache.clone());

        let saved = service
            .save_all(vec![
                Record::Entity(test_support::employee("ada", None, &["chess"])),
                Record::Entity(test_support::employee("grace", None, &[])),
            ])
            .await
            .unwrap();
        let ids: Vec<_> = saved.into_iter().map(|r| entity(r).id.unwrap()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(cache.len("Employee"), 2);

        let err = service
            .save_all(vec![Record::Entity(Employee {
                id: Some(9),
                ..Employee::default()
            })])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't save an entity when already have an ID : Employee"));

        let err = service
            .save_all(vec![Record::Entity(Employee {
                hobbies: vec![Hobby {
                    id: Some(1),
                    name: "chess".to_string(),
                }],
                ..Employee::default()
            })])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't save an entity when the relationship already has an ID"));
        assert_eq!(store.row_count(Employee::NAME).await, 2);
    }

    #[tokio::test]
    async fn test_update_all_requires_every_row() {
        let store = store();
        let service = plain(&store);
        let a = test_support::seed(&store, test_support::employee("a", None, &[])).await;
        let b = test_support::seed(&store, test_support::employee("b", None, &[])).await;

        let renamed = |employee: &Employee, name: &str| {
            Record::Entity(Employee {
                name: name.to_string(),
                ..employee.clone()
            })
        };

        let updated = service
            .update_all(vec![renamed(&a, "x"), renamed(&b, "y")])
            .await
            .unwrap();
        let names: Vec<_> = updated.into_iter().map(|r| entity(r).name).collect();
        assert_eq!(names, ["x", "y"]);

        let missing = Employee {
            id: Some(99),
            ..Employee::default()
        };
        let err = service
            .update_all(vec![renamed(&a, "z"), Record::Entity(missing)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref msg) if msg == "Employee"));

        let err = service
            .update_all(vec![Record::Entity(Employee::default())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't update an entity when they don't have an ID : Employee"));
        assert_eq!(entity(service.find_by_id(&a.id.unwrap()).await.unwrap()).name, "x");
    }

    #[tokio::test]
    async fn test_patch_all_merges_each_row() {
        let store = store();
        let service = full(&store, Arc::new(MemoryCacheStore::new()));
        let a = test_support::seed(&store, test_support::employee("a", None, &["chess"])).await;
        let b = test_support::seed(&store, test_support::employee("b", None, &["go"])).await;
        let (a, b) = (a.id.unwrap(), b.id.unwrap());

        let patches = service
            .patches_from(json!([{"id": b, "name": "y"}, {"id": a, "hobbies": []}]))
            .unwrap();
        let patched: Vec<_> = service
            .patch_all(patches)
            .await
            .unwrap()
            .into_iter()
            .map(entity)
            .collect();

        assert_eq!(patched[0].name, "y");
        assert_eq!(patched[0].hobbies[0].name, "go");
        assert_eq!(patched[1].name, "a");
        assert!(patched[1].hobbies.is_empty());

        let err = service
            .patch_all(service.patches_from(json!([{"id": 404, "name": "z"}])).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref msg) if msg == "Employee"));

        let err = service
            .patch_all(service.patches_from(json!([{"name": "z"}])).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(ref msg)
            if msg == "Can't partially update an entity when they don't have an ID : Employee"));
    }

    #[tokio::test]
    async fn test_delete_all_clears_rows_and_caches() {
        let store = store();
        let cache = Arc::new(MemoryCacheStore::new());
        let service = full(&store, cache.clone());
        let saved = test_support::seed(&store, test_support::employee("a", None, &[])).await;
        service.find_by_id(&saved.id.unwrap()).await.unwrap();
        service.find_all(Pagination::page(1, 10)).await.unwrap();

        service.delete_all().await.unwrap();
        assert_eq!(store.row_count(Employee::NAME).await, 0);
        assert!(cache.is_empty("Employee"));
        assert!(cache.is_empty("EmployeeAll"));
        assert_eq!(
            service.pipeline().interceptor_names(OperationKind::DeleteAll),
            vec!["Logging", "Caching"]
        );
    }

    #[tokio::test]
    async fn test_delete_requires_existence_and_evicts() {
        let store = store();
        let cache = Arc::new(MemoryCacheStore::new());
        let service = full(&store, cache.clone());
        let saved = test_support::seed(&store, test_support::employee("ada", None, &[])).await;
        let id = saved.id.unwrap();

        service.find_by_id(&id).await.unwrap();
        assert!(!cache.is_empty("Employee"));

        service.delete_by_id(&id).await.unwrap();
        assert!(cache.is_empty("Employee"));
        assert!(matches!(
            service.delete_by_id(&id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            service.find_by_id(&id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_find_all_cached_under_suffix() {
        let store = store();
        let cache = Arc::new(MemoryCacheStore::new());
        let service = full(&store, cache.clone());
        for name in ["a", "b"] {
            test_support::seed(&store, test_support::employee(name, None, &["x"])).await;
        }

        let page = service.find_all(Pagination::page(1, 10)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(cache.len("EmployeeAll"), 1);

        service
            .save(Record::Entity(test_support::employee("c", None, &[])))
            .await
            .unwrap();
        assert!(cache.is_empty("EmployeeAll"));
    }

    #[tokio::test]
    async fn test_mapped_service_speaks_dto() {
        let store = store();
        let service = CrudService::<Employee, EmployeeDto>::builder(store.clone())
            .registry(test_support::registry())
            .mapper(Arc::new(EmployeeMapper))
            .build()
            .unwrap();

        let record = service
            .record_from(json!({"name": "ada", "hobbies": ["chess"]}))
            .unwrap();
        assert!(matches!(record, Record::Dto(_)));

        let saved = service.save(record).await.unwrap().into_dto().unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.hobbies, vec!["chess".to_string()]);

        let found = service
            .find_by_id(&saved.id.unwrap())
            .await
            .unwrap()
            .into_dto()
            .unwrap();
        assert_eq!(found.name, "ada");
        assert_eq!(store.row_count(Hobby::NAME).await, 1);
    }

    #[test]
    fn test_record_from_rejects_malformed_body() {
        let service = plain(&store());
        let err = service.record_from(json!({"name": 5})).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
