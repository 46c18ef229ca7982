//! Structured logging setup.
//!
//! This crate is consumed as a library, so it does not install a global
//! subscriber on load; [`init`] is offered for bootstraps (and integration
//! tests) that want the same `tracing_subscriber` setup the teacher's
//! process entry point uses.

use tracing_subscriber::EnvFilter;

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs a global `tracing` subscriber honoring `RUST_LOG`, defaulting
/// to `info`. Call once, from the bootstrap's `main`.
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }
}
