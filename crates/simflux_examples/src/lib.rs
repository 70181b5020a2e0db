#![forbid(unsafe_code)]
//! Shared helpers for the simflux example binaries.
use std::path::PathBuf;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Directory for example output files, created on demand.
pub fn output_dir() -> anyhow::Result<PathBuf> {
    let dir = PathBuf::from("simflux-output");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
