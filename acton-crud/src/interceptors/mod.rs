//! Cross-cutting behaviors of the CRUD pipeline
//!
//! | Interceptor | Order | Marker | Capability |
//! |---|---|---|---|
//! | [`LoggingInterceptor`] | 0 | logging | loggable, or forced by the marker |
//! | [`CachingInterceptor`] | 100 | caching | cacheable |
//! | [`MappingInterceptor`] | 200 | mapping | mappable |
//! | [`SaveRelationshipInterceptor`] | 250 | validate relationships | relationship bearing |
//! | [`RelationshipInterceptor`] | 300 | fetch relationships | fetch relationships |

mod caching;
mod logging;
mod mapping;
mod relationship;
mod save_relationship;

pub use caching::{CacheKey, CachingInterceptor};
pub use logging::LoggingInterceptor;
pub use mapping::MappingInterceptor;
pub use relationship::RelationshipInterceptor;
pub use save_relationship::SaveRelationshipInterceptor;
