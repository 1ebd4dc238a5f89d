//! Command implementations.

mod info;
mod run;
mod stream;
mod validate;

pub use info::run_info;
pub use run::run_relay;
pub use stream::run_stream;
pub use validate::run_validate;
