//! Per-operation markers
//!
//! Markers say which behaviors an operation asks for. The default table
//! mirrors the conventional CRUD contract; services override single entries.

use super::OperationKind;

/// Request call logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogMarker {
    /// Appended to the call and finish records
    pub message: String,
    /// Log even when the service is not loggable
    pub activate_logging: bool,
}

/// Caching behavior of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMarker {
    /// Read through: return a cached value or run and store the result
    Caching {
        /// Key expression such as `#id`; the argument concatenation when `None`
        key: Option<String>,
        /// Cache names; the service's names when empty
        names: Vec<String>,
        /// Appended to every cache name
        suffix: Option<String>,
    },
    /// Always run, then store the result
    ///
    /// A bulk result is stored record by record under each record's id.
    PutCache {
        /// Key expression; the result id, then the argument concatenation, when `None`
        key: Option<String>,
        /// Cache names; the service's names when empty
        names: Vec<String>,
        /// Clear the list-query caches first
        refresh_all: bool,
    },
    /// Always run, then evict
    RemoveCache {
        /// Key expression; whole caches are cleared when `None`
        key: Option<String>,
        /// Cache names; the service's names when empty
        names: Vec<String>,
        /// Also clear the list-query caches
        refresh_all: bool,
    },
}

impl CacheMarker {
    /// Read-through caching keyed by the argument concatenation
    pub fn caching() -> Self {
        Self::Caching {
            key: None,
            names: Vec::new(),
            suffix: None,
        }
    }

    /// Store the result after running
    pub fn put() -> Self {
        Self::PutCache {
            key: None,
            names: Vec::new(),
            refresh_all: false,
        }
    }

    /// Evict after running
    pub fn remove() -> Self {
        Self::RemoveCache {
            key: None,
            names: Vec::new(),
            refresh_all: false,
        }
    }

    /// Set the key expression
    #[must_use]
    pub fn key(mut self, expression: impl Into<String>) -> Self {
        match &mut self {
            Self::Caching { key, .. } | Self::PutCache { key, .. } | Self::RemoveCache { key, .. } => {
                *key = Some(expression.into());
            }
        }
        self
    }

    /// Use specific cache names instead of the service's
    #[must_use]
    pub fn names<I, S>(mut self, cache_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache_names = cache_names.into_iter().map(Into::into).collect();
        match &mut self {
            Self::Caching { names, .. } | Self::PutCache { names, .. } | Self::RemoveCache { names, .. } => {
                *names = cache_names;
            }
        }
        self
    }

    /// Append a suffix to every cache name of a read-through marker
    #[must_use]
    pub fn suffix(mut self, value: impl Into<String>) -> Self {
        if let Self::Caching { suffix, .. } = &mut self {
            *suffix = Some(value.into());
        }
        self
    }

    /// Clear the list-query caches on write
    #[must_use]
    pub fn refresh_all(mut self) -> Self {
        match &mut self {
            Self::PutCache { refresh_all, .. } | Self::RemoveCache { refresh_all, .. } => {
                *refresh_all = true;
            }
            Self::Caching { .. } => {}
        }
        self
    }

    /// Key expression, if any
    pub fn key_expression(&self) -> Option<&str> {
        match self {
            Self::Caching { key, .. } | Self::PutCache { key, .. } | Self::RemoveCache { key, .. } => {
                key.as_deref()
            }
        }
    }

    /// Cache names of the marker, empty when the service's apply
    pub fn cache_names(&self) -> &[String] {
        match self {
            Self::Caching { names, .. } | Self::PutCache { names, .. } | Self::RemoveCache { names, .. } => {
                names
            }
        }
    }
}

/// Conversion between entity and DTO around an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingMarker {
    /// Convert a DTO argument to an entity before running
    pub map_argument: bool,
    /// Convert an entity result to a DTO after running
    pub map_result: bool,
}

impl MappingMarker {
    /// Result only
    pub const fn result() -> Self {
        Self {
            map_argument: false,
            map_result: true,
        }
    }

    /// Argument and result
    pub const fn both() -> Self {
        Self {
            map_argument: true,
            map_result: true,
        }
    }
}

/// Every marker of one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationMarkers {
    /// Call logging
    pub logging: Option<LogMarker>,
    /// Caching
    pub caching: Option<CacheMarker>,
    /// Entity and DTO conversion
    pub mapping: Option<MappingMarker>,
    /// Reject saves whose relationship targets already carry an id
    pub validate_relationships: bool,
    /// Hydrate relationships through the eager-fetch repository
    pub fetch_relationships: bool,
}

impl OperationMarkers {
    /// No markers at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Conventional markers of an operation
    pub fn defaults(kind: OperationKind) -> Self {
        let logging = Some(LogMarker::default());
        match kind {
            OperationKind::FindAll => Self {
                logging,
                caching: Some(CacheMarker::caching().suffix("All")),
                mapping: Some(MappingMarker::result()),
                validate_relationships: false,
                fetch_relationships: true,
            },
            OperationKind::FindById => Self {
                logging,
                caching: Some(CacheMarker::caching().key("#id")),
                mapping: Some(MappingMarker::result()),
                validate_relationships: false,
                fetch_relationships: true,
            },
            OperationKind::Save => Self {
                logging,
                caching: Some(CacheMarker::put().refresh_all()),
                mapping: Some(MappingMarker::both()),
                validate_relationships: true,
                fetch_relationships: false,
            },
            OperationKind::UpdateById | OperationKind::PatchById => Self {
                logging,
                caching: Some(CacheMarker::put().key("#id").refresh_all()),
                mapping: Some(MappingMarker::both()),
                validate_relationships: false,
                fetch_relationships: false,
            },
            OperationKind::DeleteById => Self {
                logging,
                caching: Some(CacheMarker::remove().key("#id").refresh_all()),
                mapping: None,
                validate_relationships: false,
                fetch_relationships: false,
            },
            OperationKind::SaveAll => Self {
                logging,
                caching: Some(CacheMarker::put().refresh_all()),
                mapping: Some(MappingMarker::both()),
                validate_relationships: true,
                fetch_relationships: false,
            },
            OperationKind::UpdateAll | OperationKind::PatchAll => Self {
                logging,
                caching: Some(CacheMarker::put().refresh_all()),
                mapping: Some(MappingMarker::both()),
                validate_relationships: false,
                fetch_relationships: false,
            },
            OperationKind::DeleteAll => Self {
                logging,
                caching: Some(CacheMarker::remove().refresh_all()),
                mapping: None,
                validate_relationships: false,
                fetch_relationships: false,
            },
        }
    }

    /// Replace the logging marker
    #[must_use]
    pub fn with_logging(mut self, marker: Option<LogMarker>) -> Self {
        self.logging = marker;
        self
    }

    /// Replace the caching marker
    #[must_use]
    pub fn with_caching(mut self, marker: Option<CacheMarker>) -> Self {
        self.caching = marker;
        self
    }

    /// Replace the mapping marker
    #[must_use]
    pub fn with_mapping(mut self, marker: Option<MappingMarker>) -> Self {
        self.mapping = marker;
        self
    }

    /// Toggle save-relationship validation
    #[must_use]
    pub fn with_validate_relationships(mut self, enabled: bool) -> Self {
        self.validate_relationships = enabled;
        self
    }

    /// Toggle relationship fetching
    #[must_use]
    pub fn with_fetch_relationships(mut self, enabled: bool) -> Self {
        self.fetch_relationships = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_defaults() {
        let markers = OperationMarkers::defaults(OperationKind::FindById);
        assert!(markers.fetch_relationships);
        assert!(!markers.validate_relationships);
        assert_eq!(
            markers.caching.as_ref().and_then(CacheMarker::key_expression),
            Some("#id")
        );
        assert_eq!(markers.mapping, Some(MappingMarker::result()));

        let markers = OperationMarkers::defaults(OperationKind::FindAll);
        assert!(matches!(
            markers.caching,
            Some(CacheMarker::Caching { suffix: Some(ref s), key: None, .. }) if s == "All"
        ));
    }

    #[test]
    fn test_write_defaults() {
        let save = OperationMarkers::defaults(OperationKind::Save);
        assert!(save.validate_relationships);
        assert!(matches!(
            save.caching,
            Some(CacheMarker::PutCache { key: None, refresh_all: true, .. })
        ));
        assert_eq!(save.mapping, Some(MappingMarker::both()));

        let delete = OperationMarkers::defaults(OperationKind::DeleteById);
        assert!(delete.mapping.is_none());
        assert!(matches!(
            delete.caching,
            Some(CacheMarker::RemoveCache { refresh_all: true, .. })
        ));
    }

    #[test]
    fn test_bulk_defaults() {
        let save_all = OperationMarkers::defaults(OperationKind::SaveAll);
        assert!(save_all.validate_relationships);
        assert_eq!(save_all.mapping, Some(MappingMarker::both()));

        let patch_all = OperationMarkers::defaults(OperationKind::PatchAll);
        assert!(!patch_all.validate_relationships);
        assert!(matches!(
            patch_all.caching,
            Some(CacheMarker::PutCache { key: None, refresh_all: true, .. })
        ));

        let delete_all = OperationMarkers::defaults(OperationKind::DeleteAll);
        assert!(matches!(
            delete_all.caching,
            Some(CacheMarker::RemoveCache { key: None, refresh_all: true, .. })
        ));
    }

    #[test]
    fn test_marker_builders() {
        let marker = CacheMarker::remove().names(["a", "b"]).key("#id");
        assert_eq!(marker.cache_names(), ["a".to_string(), "b".to_string()]);
        assert_eq!(marker.key_expression(), Some("#id"));

        // suffix only applies to read-through markers
        assert_eq!(CacheMarker::put().suffix("All"), CacheMarker::put());
    }
}
