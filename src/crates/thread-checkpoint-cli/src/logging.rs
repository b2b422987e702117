//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber writing to stderr
///
/// `RUST_LOG` wins over `level`. Returns false when a subscriber was already set.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
