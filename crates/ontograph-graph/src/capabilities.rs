//! Backend capability profiles

use ontograph_core::CapabilityOverrides;
use serde::{Deserialize, Serialize};

/// What a graph backend supports. Fixed once a service is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Element IDs may be assigned by the client
    pub supports_user_defined_ids: bool,
    /// Element IDs may be numeric
    pub supports_non_string_ids: bool,
    /// Property keys, labels and indexes can be declared
    pub supports_schema: bool,
    pub supports_transactions: bool,
    pub supports_geoshape: bool,
    /// Fluent `by()` modulators on `valueMap` and `project`
    pub supports_traversals_by: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::GREMLIN_SERVER
    }
}

impl Capabilities {
    pub const TINKERGRAPH: Capabilities = Capabilities {
        supports_user_defined_ids: true,
        supports_non_string_ids: true,
        supports_schema: true,
        supports_transactions: false,
        supports_geoshape: false,
        supports_traversals_by: true,
    };

    pub const GREMLIN_SERVER: Capabilities = Capabilities {
        supports_user_defined_ids: true,
        supports_non_string_ids: false,
        supports_schema: false,
        supports_transactions: false,
        supports_geoshape: false,
        supports_traversals_by: false,
    };

    pub const JANUSGRAPH: Capabilities = Capabilities {
        supports_user_defined_ids: false,
        supports_non_string_ids: true,
        supports_schema: true,
        supports_transactions: true,
        supports_geoshape: true,
        supports_traversals_by: true,
    };

    pub const COSMOSDB: Capabilities = Capabilities {
        supports_user_defined_ids: true,
        supports_non_string_ids: false,
        supports_schema: false,
        supports_transactions: false,
        supports_geoshape: false,
        supports_traversals_by: false,
    };

    /// Apply deployment overrides before the profile is frozen
    pub fn with_overrides(self, overrides: &CapabilityOverrides) -> Self {
        Self {
            supports_user_defined_ids: overrides
                .supports_user_defined_ids
                .unwrap_or(self.supports_user_defined_ids),
            supports_non_string_ids: overrides
                .supports_non_string_ids
                .unwrap_or(self.supports_non_string_ids),
            supports_schema: overrides.supports_schema.unwrap_or(self.supports_schema),
            supports_transactions: overrides
                .supports_transactions
                .unwrap_or(self.supports_transactions),
            supports_geoshape: overrides.supports_geoshape.unwrap_or(self.supports_geoshape),
            supports_traversals_by: overrides
                .supports_traversals_by
                .unwrap_or(self.supports_traversals_by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_only_touch_set_flags() {
        let overrides = CapabilityOverrides {
            supports_transactions: Some(true),
            supports_traversals_by: Some(false),
            ..Default::default()
        };

        let caps = Capabilities::TINKERGRAPH.with_overrides(&overrides);
        assert!(caps.supports_transactions);
        assert!(!caps.supports_traversals_by);
        assert!(caps.supports_user_defined_ids);
        assert!(caps.supports_non_string_ids);
    }

    #[test]
    fn test_profiles_differ() {
        assert_ne!(Capabilities::JANUSGRAPH, Capabilities::COSMOSDB);
        assert!(!Capabilities::JANUSGRAPH.supports_user_defined_ids);
        assert!(!Capabilities::COSMOSDB.supports_non_string_ids);
        assert_eq!(Capabilities::default(), Capabilities::GREMLIN_SERVER);
    }
}
