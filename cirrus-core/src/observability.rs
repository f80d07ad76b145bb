//! Logging setup.
//!
//! The libraries only emit `tracing` events. Binaries (and tests that want to
//! see output) install a subscriber; with the `tracing-basic` feature enabled
//! [`init_tracing`] does so using `RUST_LOG` for filtering.

/// Install a formatted subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already installed.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`] but emits JSON lines.
#[cfg(feature = "tracing-basic")]
pub fn init_json_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}

/// Without `tracing-basic` there is nothing to install.
#[cfg(not(feature = "tracing-basic"))]
pub fn init_tracing() -> bool {
    false
}
