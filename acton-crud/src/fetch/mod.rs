//! Relationship-aware eager fetching
//!
//! [`QueryPlanner`] turns an entity type into a [`FetchSpecification`]: join
//! clauses for the relationships that are safe to fetch in one query, plus the
//! collection paths that must be deferred to avoid row multiplication.
//! [`QueryExecutor`] runs the primary query against a [`QueryEngine`] and
//! resolves deferred paths with batched secondary queries.
//! [`EagerFetchRepository`] exposes the pair as a typed
//! [`FetchRelationshipRepository`](crate::repository::FetchRelationshipRepository).

mod executor;
mod planner;
mod query;
mod repository;

pub use executor::{extract_ids, QueryExecutor};
pub use planner::{DeferredPath, FetchSpecification, FieldPath, JoinFetch, QueryPlanner, ROOT_ALIAS};
pub use query::{FetchQuery, QueryEngine, QueryParameter};
pub use repository::EagerFetchRepository;
