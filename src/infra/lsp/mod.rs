//! LSP Infrastructure for symlens
//!
//! Provides race-safe Language Server Protocol communication:
//! - JSON-RPC 2.0 protocol types
//! - Async message transport with `Content-Length` framing
//! - Thread-safe client with atomic request IDs
//! - Server locator, installer and per-language manager

pub mod client;
pub mod installer;
pub mod manager;
pub mod protocol;
pub mod servers;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::LspClient;
pub use manager::{LspManager, ServerLauncher, ServerState, ServerStatus};
pub use servers::{ServerLocator, ServerSpec};
