//! # acton-crud
//!
//! Generic CRUD services for serde entity graphs.
//!
//! ## Features
//!
//! - **Eager fetching**: relationship graphs hydrated with one primary query
//!   plus one batched query per deferred entity type, never a cartesian join
//! - **Interception pipeline**: logging, caching, DTO mapping, save
//!   validation and relationship fetching, ordered and selected once per
//!   operation when the service is built
//! - **Caching**: named caches in memory or in Redis (`redis` feature)
//! - **REST routes**: axum handlers for every operation (`http` feature)
//! - **Configuration**: layered TOML and `ACTON_` environment variables
//!
//! ## Example
//!
//! ```rust,ignore
//! use acton_crud::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let registry = EntityRegistry::global();
//!     registry.register::<Employee>().register::<Department>();
//!
//!     let store = Arc::new(MemoryStore::new(registry.clone()));
//!     let service = CrudService::<Employee>::builder(store.clone())
//!         .fetch_relationships(Arc::new(EagerFetchRepository::with_config(
//!             store,
//!             registry,
//!             &config.fetch,
//!         )))
//!         .cache(Arc::new(MemoryCacheStore::new()))
//!         .config(&config)
//!         .build()?;
//!
//!     let app = Router::new().nest("/employees", crud_routes(Arc::new(service)));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
//!         .await
//!         .map_err(|e| Error::Internal(e.to_string()))?;
//!     axum::serve(listener, app)
//!         .await
//!         .map_err(|e| Error::Internal(e.to_string()))
//! }
//! ```

pub mod cache;
pub mod capability;
pub mod config;
pub mod entity;
pub mod error;
pub mod fetch;
#[cfg(feature = "http")]
pub mod handlers;
pub mod interceptors;
pub mod mapper;
pub mod observability;
pub mod pipeline;
pub mod repository;
pub mod service;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheStore, MemoryCacheStore};

    #[cfg(feature = "redis")]
    pub use crate::cache::{create_pool, RedisCacheStore};

    pub use crate::capability::Capabilities;
    pub use crate::config::Config;
    pub use crate::entity::{
        CollectionKind, Entity, EntityRegistry, EntitySchema, Presentation, Relation,
    };
    pub use crate::error::{Error, Result};
    pub use crate::fetch::{EagerFetchRepository, QueryEngine};

    #[cfg(feature = "http")]
    pub use crate::handlers::crud_routes;

    pub use crate::interceptors::{
        CachingInterceptor, LoggingInterceptor, MappingInterceptor, RelationshipInterceptor,
        SaveRelationshipInterceptor,
    };
    pub use crate::mapper::{Mapper, SerdeMapper};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        CacheMarker, Interceptor, LogMarker, MappingMarker, Operation, OperationKind,
        OperationMarkers, Output, Patch, PatchForm, Record,
    };
    pub use crate::repository::{
        FetchRelationshipRepository, MemoryStore, Page, Pagination, Repository,
    };
    pub use crate::service::{CrudService, CrudServiceBuilder};

    pub use std::sync::Arc;

    pub use axum::Router;
}
