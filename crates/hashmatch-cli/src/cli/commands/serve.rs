//! Serve command: run the verification HTTP server.

use anyhow::Result;
use hashmatch_core::config::HashmatchConfig;

use crate::server;

pub async fn run_serve(cfg: &HashmatchConfig) -> Result<()> {
    server::run(cfg).await
}
