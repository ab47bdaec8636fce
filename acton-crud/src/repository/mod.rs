//! Persistence contracts consumed by the CRUD pipeline
//!
//! # Features
//!
//! - **Base persistence**: [`Repository`] for find, save, delete and id paging
//! - **Eager fetching**: [`FetchRelationshipRepository`], the optional
//!   capability that hydrates relationship graphs in one pass
//! - **Pagination**: [`Pagination`] and [`Page`]
//! - **Reference store**: [`MemoryStore`], an in-memory implementation of both
//!   the repository and the query engine
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_crud::repository::{MemoryStore, Pagination, Repository};
//!
//! let store = Arc::new(MemoryStore::new(registry));
//! let saved = Repository::<Employee>::save(&*store, employee).await?;
//! let ids = Repository::<Employee>::find_all_ids(&*store, &Pagination::first_page(20)).await?;
//! ```

mod error;
mod memory;
mod pagination;
mod traits;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use memory::MemoryStore;
pub use pagination::{Page, Pagination};
pub use traits::{FetchRelationshipRepository, Repository};
