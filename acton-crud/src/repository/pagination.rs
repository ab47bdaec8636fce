//! Pagination types for repository queries
//!
//! # Example
//!
//! ```rust
//! use acton_crud::repository::{Page, Pagination};
//!
//! let pagination = Pagination::page(2, 20);
//! assert_eq!(pagination.offset, 20);
//!
//! let page = Page::new(vec![1, 2, 3], &Pagination::first_page(3), 10);
//! assert_eq!(page.total, 10);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pagination parameters for limiting query results
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Create pagination for the first page with the given limit
    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Create pagination for a specific page number (1-indexed)
    ///
    /// The offset saturates at `u64::MAX` instead of overflowing.
    ///
    /// ```rust
    /// use acton_crud::repository::Pagination;
    ///
    /// let page3 = Pagination::page(3, 20);
    /// assert_eq!(page3.offset, 40);
    /// assert_eq!(page3.limit, 20);
    /// ```
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

impl fmt::Display for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset={},limit={}", self.offset, self.limit)
    }
}

/// One page of results together with the total size of the unpaged result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items of this page
    pub content: Vec<T>,
    /// Offset this page starts at
    pub offset: u64,
    /// Requested page size
    pub limit: u64,
    /// Number of items across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Create a page from its content and the pagination that produced it
    pub fn new(content: Vec<T>, pagination: &Pagination, total: u64) -> Self {
        Self {
            content,
            offset: pagination.offset,
            limit: pagination.limit,
            total,
        }
    }

    /// Pagination that produced this page
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.offset, self.limit)
    }

    /// Transform every item while keeping the page boundaries
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total: self.total,
        }
    }

    /// Fallible [`Page::map`]
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            offset: self.offset,
            limit: self.limit,
            total: self.total,
        })
    }

    /// Replace the content, keeping the page boundaries and total
    pub fn with_content<U>(&self, content: Vec<U>) -> Page<U> {
        Page {
            content,
            offset: self.offset,
            limit: self.limit,
            total: self.total,
        }
    }

    /// Number of items on this page
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether this page has no items
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
