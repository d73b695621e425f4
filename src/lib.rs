//! Health analytics engine
//!
//! Estimates body-composition change and activity patterns from wearable
//! aggregates, then turns them into ranked coaching actions through a
//! language-model provider.

pub mod aggregate;
pub mod cache;
pub mod comparison;
pub mod composition;
pub mod config;
pub mod db;
pub mod history;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod patterns;
pub mod prompt;

#[cfg(test)]
pub mod test_utils;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVE: &str = "health_coach=info";

/// Install the fmt subscriber. `RUST_LOG` wins over the default directive.
/// Later calls are no-ops.
pub fn init_tracing() {
  init_tracing_with(DEFAULT_LOG_DIRECTIVE);
}

pub fn init_tracing_with(default_directive: &str) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init();
}
