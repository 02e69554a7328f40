//! # Observability
//!
//! Structured logging for the node. HTTP requests are traced by the
//! `TraceLayer` installed in [`crate::api::create_router`].

mod logging;

pub use logging::{init_logging, LogFormat};
