//! Duologue API Library Crate
//!
//! This library contains the web service around the conversation core:
//! configuration, the filesystem transcript store, REST handlers for sharing,
//! the per-connection WebSocket session, and routing. The binaries in `bin/`
//! are thin wrappers around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod store;
pub mod ws;
