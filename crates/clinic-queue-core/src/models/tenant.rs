//! Tenant scoping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest tenant id accepted at the boundary.
const MAX_TENANT_ID_LEN: usize = 128;

/// A validated tenant id.
///
/// Every registry read and write takes a `&TenantScope`, so a query without a
/// tenant filter cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope(String);

impl TenantScope {
    /// Build a scope from a raw tenant id.
    ///
    /// Returns `None` for empty, whitespace-only or oversized ids.
    pub fn new(tenant_id: &str) -> Option<Self> {
        let trimmed = tenant_id.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_TENANT_ID_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The raw tenant id.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
