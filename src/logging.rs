//! Logging setup for hosts embedding Selene.
//!
//! The crates in this workspace emit `tracing` events: call traces at
//! `trace`, lookups of non-callable globals at `debug` and absorbed script
//! failures at `warn`. Hosts with their own subscriber need nothing from
//! this module.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable read for the log filter.
pub const ENV_VAR: &str = "SELENE_LOG";

/// Filter used when [`ENV_VAR`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "selene=info,selene_core=info,selene_modules=info";

/// Install a compact fmt subscriber filtered by `SELENE_LOG`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init() {
    let filter =
        EnvFilter::try_from_env(ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok();
}
