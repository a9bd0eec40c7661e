//! Core library for the boardsync command line application.
//!
//! boardsync reconciles records between a board-based work-tracking service
//! (GraphQL over HTTP) and a business-management suite (XML-RPC), mirroring
//! applicants and employees created or updated in one system into the other.
//! The modules are structured to keep responsibilities narrow and
//! composable: remote clients live in [`board`] and [`suite`] (with the
//! XML-RPC codec in [`xmlrpc`]), data representations inside [`model`], the
//! planning logic in [`engine`], and the per-run orchestration under
//! [`sync`]. Credentials and run configuration are handled by [`secrets`]
//! and [`config`].

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod secrets;
pub mod suite;
pub mod sync;
pub mod xmlrpc;

pub use error::{Result, SyncError};
