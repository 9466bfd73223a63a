//! Logging helpers
//!
//! Thin wrapper around `env_logger`; `RUST_LOG` always wins over the
//! configured level.

/// Initialize the global logger
///
/// # Parameters
///
/// * `level` - Default filter used when `RUST_LOG` is not set
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding applications) is not an error
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
