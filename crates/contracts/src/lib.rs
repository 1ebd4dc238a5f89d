//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the log relay.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Model
//! - A [`LogLine`] is produced once and fanned out to every configured sink
//! - A sink is identified by [`SinkId`]: the global singleton or one per tenant
//! - Sink settings are read through [`SinkConfigProvider`], delivery goes
//!   through [`DestinationTransport`]

mod error;
mod line;
mod provider;
mod relay_config;
mod settings;
mod sink_id;
mod transport;

pub use error::*;
pub use line::LogLine;
pub use provider::SinkConfigProvider;
pub use relay_config::*;
pub use settings::*;
pub use sink_id::{ChannelId, SinkId, TenantId};
pub use transport::{DestinationTransport, LocalDestinationTransport, MessageHandle};
