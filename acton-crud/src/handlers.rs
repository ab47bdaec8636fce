//! REST routes over a [`CrudService`]
//!
//! | Method | Path | Operation | Success |
//! |---|---|---|---|
//! | GET | `/` | `find_all` (`?page=&size=`) | 200 |
//! | GET | `/{id}` | `find_by_id` | 200 |
//! | POST | `/` | `save` | 201 |
//! | POST | `/bulk` | `save_all` | 201 |
//! | PUT | `/` | `update_all` | 200 |
//! | PATCH | `/` | `patch_all` | 200 |
//! | DELETE | `/` | `delete_all` | 204 |
//! | PUT | `/{id}` | `update_by_id` | 200 |
//! | PATCH | `/{id}` | `patch_by_id` | 200 |
//! | DELETE | `/{id}` | `delete_by_id` | 204 |
//!
//! Errors are rendered by [`Error`]'s `IntoResponse` implementation.
//!
//! ```rust,ignore
//! let app = Router::new().nest("/employees", crud_routes(Arc::new(service)));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::entity::{Entity, Presentation};
use crate::error::Result;
use crate::pipeline::Record;
use crate::repository::{Page, Pagination};
use crate::service::CrudService;

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum allowed items per page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paging parameters of a list request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    /// Page number (1-indexed), 1 when absent
    pub page: Option<u32>,
    /// Items per page, [`DEFAULT_PAGE_SIZE`] when absent, capped at [`MAX_PAGE_SIZE`]
    pub size: Option<u32>,
}

impl PageQuery {
    /// Repository pagination of this request
    pub fn pagination(&self) -> Pagination {
        let page = self.page.unwrap_or(1).max(1);
        let size = match self.size {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
        };
        Pagination::page(u64::from(page), u64::from(size))
    }
}

type Service<E, D> = State<Arc<CrudService<E, D>>>;

fn documents<E: Presentation, D: Presentation>(records: Vec<Record<E, D>>) -> Result<Vec<Value>> {
    records.iter().map(Record::to_document).collect()
}

async fn find_all<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Value>>> {
    let page = service.find_all(query.pagination()).await?;
    Ok(Json(page.try_map(|record| record.to_document())?))
}

async fn find_by_id<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Path(id): Path<E::Id>,
) -> Result<Json<Value>> {
    Ok(Json(service.find_by_id(&id).await?.to_document()?))
}

async fn save<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let saved = service.save(service.record_from(body)?).await?;
    Ok((StatusCode::CREATED, Json(saved.to_document()?)))
}

async fn update_by_id<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Path(id): Path<E::Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let updated = service.update_by_id(&id, service.record_from(body)?).await?;
    Ok(Json(updated.to_document()?))
}

async fn patch_by_id<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Path(id): Path<E::Id>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let patched = service.patch_by_id(&id, service.patch_from(body)?).await?;
    Ok(Json(patched.to_document()?))
}

async fn delete_by_id<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Path(id): Path<E::Id>,
) -> Result<StatusCode> {
    service.delete_by_id(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_all<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Vec<Value>>)> {
    let saved = service.save_all(service.records_from(body)?).await?;
    Ok((StatusCode::CREATED, Json(documents(saved)?)))
}

async fn update_all<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<Value>>> {
    let updated = service.update_all(service.records_from(body)?).await?;
    Ok(Json(documents(updated)?))
}

async fn patch_all<E: Entity, D: Presentation>(
    State(service): Service<E, D>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<Value>>> {
    let patched = service.patch_all(service.patches_from(body)?).await?;
    Ok(Json(documents(patched)?))
}

async fn delete_all<E: Entity, D: Presentation>(State(service): Service<E, D>) -> Result<StatusCode> {
    service.delete_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Router exposing every operation of `service`
pub fn crud_routes<E: Entity, D: Presentation>(service: Arc<CrudService<E, D>>) -> Router {
    Router::new()
        .route(
            "/",
            get(find_all::<E, D>)
                .post(save::<E, D>)
                .put(update_all::<E, D>)
                .patch(patch_all::<E, D>)
                .delete(delete_all::<E, D>),
        )
        .route("/bulk", post(save_all::<E, D>))
        .route(
            "/{id}",
            get(find_by_id::<E, D>)
                .put(update_by_id::<E, D>)
                .patch(patch_by_id::<E, D>)
                .delete(delete_by_id::<E, D>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
