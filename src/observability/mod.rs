//! Observability for the session runner
//!
//! Structured logging configuration; all diagnostics are emitted as tracing
//! events with contextual fields.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
