//! Middleware layer.
//!
//! Cross-cutting concerns that wrap every request regardless of route.
//!
//! - [`trace`]: per-request span and outcome log

pub mod trace;
