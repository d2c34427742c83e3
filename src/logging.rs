//! Logging init helpers for embedding layers and tests.
//!
//! The engine itself only emits `tracing` events; whichever frontend embeds
//! it decides where they go. These helpers cover the common cases.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,segfetch=debug"))
}

/// Initialize logging to stderr. Returns Err if a global subscriber is
/// already set (e.g. by the embedding application).
pub fn init_stderr() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
}

/// Initialize logging to an arbitrary writer (a log file the frontend
/// opened, a test capture buffer).
pub fn init_writer<W>(make_writer: W) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(make_writer)
        .with_ansi(false)
        .try_init()
}
