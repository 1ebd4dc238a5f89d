//! SinkConfigProvider trait - narrow read contract over sink configuration
//!
//! The relay never depends on how settings are stored.

use std::sync::Arc;

use crate::{ContractError, SinkConfig, SinkId, TenantId};

/// Read-only view of sink configuration.
///
/// Every call returns a fresh snapshot; administrative changes become visible
/// on the next call.
pub trait SinkConfigProvider: Send + Sync {
    /// Current configuration of a sink, or `None` if it holds no destination
    fn sink_config(&self, sink: SinkId) -> Result<Option<SinkConfig>, ContractError>;

    /// All tenants currently holding a destination, ascending
    fn tenant_sinks(&self) -> Result<Vec<TenantId>, ContractError>;
}

impl<P: SinkConfigProvider + ?Sized> SinkConfigProvider for Arc<P> {
    fn sink_config(&self, sink: SinkId) -> Result<Option<SinkConfig>, ContractError> {
        (**self).sink_config(sink)
    }

    fn tenant_sinks(&self) -> Result<Vec<TenantId>, ContractError> {
        (**self).tenant_sinks()
    }
}
