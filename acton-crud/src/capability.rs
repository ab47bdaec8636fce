//! Capabilities of a CRUD service
//!
//! Computed once when the service is built. Each interceptor is included in an
//! operation's chain only when the capability it needs is present, so nothing
//! is re-evaluated per call.

/// Feature flags of one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The repository can hydrate relationship graphs in one pass
    pub fetch_relationships: bool,
    /// A cache store is attached
    pub cacheable: bool,
    /// A mapper is attached
    pub mappable: bool,
    /// Calls are logged
    pub loggable: bool,
    /// The entity declares at least one relationship
    pub relationship_bearing: bool,
}

impl Capabilities {
    /// No capabilities
    pub const fn none() -> Self {
        Self {
            fetch_relationships: false,
            cacheable: false,
            mappable: false,
            loggable: false,
            relationship_bearing: false,
        }
    }
}
