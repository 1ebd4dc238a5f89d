//! SinkId - identifies one delivery destination slot
//!
//! There is exactly one global sink and at most one sink per tenant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Tenant (guild) identifier
pub type TenantId = u64;

/// Destination channel identifier. `0` never names a real channel.
pub type ChannelId = u64;

/// Sink identifier.
///
/// Ordering puts `Global` before every tenant, and tenants in ascending id
/// order, which is also the relay's dispatch order.
///
/// # Examples
/// ```
/// use contracts::SinkId;
///
/// let id: SinkId = "global".parse().unwrap();
/// assert_eq!(id, SinkId::Global);
/// assert_eq!("42".parse::<SinkId>().unwrap(), SinkId::Tenant(42));
/// assert_eq!(SinkId::Tenant(42).to_string(), "tenant:42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkId {
    /// Reserved process-wide sink
    Global,
    /// Per-tenant sink
    Tenant(TenantId),
}

impl SinkId {
    /// Tenant id, if this is a tenant sink
    #[inline]
    pub fn tenant(&self) -> Option<TenantId> {
        match self {
            Self::Global => None,
            Self::Tenant(id) => Some(*id),
        }
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Tenant(id) => write!(f, "tenant:{id}"),
        }
    }
}

impl FromStr for SinkId {
    type Err = ContractError;

    /// Accepts `global`, `tenant:<id>` or a bare `<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("global") {
            return Ok(Self::Global);
        }
        let raw = s.strip_prefix("tenant:").unwrap_or(s);
        raw.parse::<TenantId>().map(Self::Tenant).map_err(|_| {
            ContractError::config_validation(
                "sink",
                format!("expected 'global' or a tenant id, got '{s}'"),
            )
        })
    }
}

impl From<TenantId> for SinkId {
    #[inline]
    fn from(id: TenantId) -> Self {
        Self::Tenant(id)
    }
}
