//! CLI command handlers.

mod checksum;
mod serve;

pub use checksum::run_checksum;
pub use serve::run_serve;
