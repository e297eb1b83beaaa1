//! Ledgate - ordered-log write gateway for RESP key-value stores.
//!
//! Ledgate sits between Redis-protocol clients and a key-value store. Every
//! command is classified by verb: reads are forwarded to the store, writes
//! are first appended to an ordered log and applied to the store only once
//! the log has acknowledged them, and policy-refused commands are rejected
//! in-protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RESP2 clients                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Gateway                                │
//! │        sessions │ classifier / resolver │ handler registry      │
//! └─────────────────────────────────────────────────────────────────┘
//!                  │ read                          │ write
//!                  │               ┌───────────────────────────────┐
//!                  │               │  Committer → ordered log      │
//!                  │               │  (mem:// or file:// segments) │
//!                  │               └───────────────────────────────┘
//!                  ▼                               ▼ on ack
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Backend KV store                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`protocol`] - RESP2 values, parser, encoder and framed reader
//! - [`gateway`] - listener, sessions, classification and dispatch
//! - [`stream`] - log clients, stream binding and committer
//! - [`backend`] - backend store contract and implementations
//! - [`proxy`] - the read / write / reject handlers
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Component wiring and lifecycle
//! - [`core::error`] - Error types and RESP error mapping
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - A write reaches the backend only after the log acknowledged it
//! - Replies on a connection are written in request order
//! - A stream binding has at most one owner at a time

// Core infrastructure
pub mod core;

// Wire protocol
pub mod protocol;

// Client-facing gateway
pub mod gateway;

// Ordered write log
pub mod stream;

// Backend stores
pub mod backend;

// Gateway handlers
pub mod proxy;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use gateway::{Classification, Gateway, GatewayOptions};
pub use protocol::{Command, RespValue};
pub use stream::{Committer, StreamBinding, StreamOptions};
