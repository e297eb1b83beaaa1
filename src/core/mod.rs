//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Component wiring and lifecycle
//! - [`error`] - Error types and RESP error mapping

pub mod config;
pub mod error;
pub mod runtime;
