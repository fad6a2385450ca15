//! Tenant identity.
//!
//! Every record, row and emitted event in an Atlas deployment belongs to exactly
//! one tenant. A tenant is identified by an opaque UUID plus the game region and
//! client version it serves; two tenants are the same only when all four parts
//! match.
//!
//! # Example
//!
//! ```
//! use atlas_core::tenant::Tenant;
//! use uuid::Uuid;
//!
//! let id = Uuid::new_v4();
//! let gms = Tenant::new(id, "GMS", 83, 1).unwrap();
//! assert!(gms.is(&Tenant::new(id, "GMS", 83, 1).unwrap()));
//! assert!(!gms.is(&Tenant::new(id, "GMS", 87, 1).unwrap()));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while constructing a [`Tenant`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    /// Region tag was empty
    #[error("Tenant region must not be empty")]
    EmptyRegion,

    /// A tenant field could not be parsed from its wire representation
    #[error("Invalid tenant field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Why parsing failed
        reason: String,
    },
}

/// A multi-tenancy identity: `(id, region, major_version, minor_version)`.
///
/// Immutable once built. Attached to an
/// [`OperationContext`](crate::context::OperationContext) for the duration of a
/// single record's processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    id: Uuid,
    region: String,
    major_version: u16,
    minor_version: u16,
}

impl Tenant {
    /// Build a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::EmptyRegion`] when `region` is blank.
    pub fn new(
        id: Uuid,
        region: impl Into<String>,
        major_version: u16,
        minor_version: u16,
    ) -> Result<Self, TenantError> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(TenantError::EmptyRegion);
        }
        Ok(Self {
            id,
            region,
            major_version,
            minor_version,
        })
    }

    /// Parse a tenant from its four header string values.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::InvalidField`] if the id is not a UUID or either
    /// version is not a base-10 `u16`, and [`TenantError::EmptyRegion`] for a
    /// blank region.
    pub fn parse(id: &str, region: &str, major: &str, minor: &str) -> Result<Self, TenantError> {
        let id = Uuid::parse_str(id.trim()).map_err(|e| TenantError::InvalidField {
            field: "id",
            reason: e.to_string(),
        })?;
        let major_version = major.trim().parse::<u16>().map_err(|e| TenantError::InvalidField {
            field: "major_version",
            reason: e.to_string(),
        })?;
        let minor_version = minor.trim().parse::<u16>().map_err(|e| TenantError::InvalidField {
            field: "minor_version",
            reason: e.to_string(),
        })?;
        Self::new(id, region.trim(), major_version, minor_version)
    }

    /// Tenant identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Region tag (e.g. `GMS`).
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Client major version.
    #[must_use]
    pub const fn major_version(&self) -> u16 {
        self.major_version
    }

    /// Client minor version.
    #[must_use]
    pub const fn minor_version(&self) -> u16 {
        self.minor_version
    }

    /// Whether `other` denotes the same tenant.
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} v{}.{}]",
            self.id, self.region, self.major_version, self.minor_version
        )
    }
}
