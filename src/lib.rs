//! symlens - symbol navigation and editing over language servers
//!
//! Drives stdio language servers, normalizes their document symbols into one
//! tree model addressed by name paths, and edits files relative to symbols.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod models;
pub mod services;

pub use error::{SymlensError, SymlensResult};
