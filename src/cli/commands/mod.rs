//! Command implementations for symlens
//!
//! Each command is implemented in its own module.

pub mod cache;
pub mod config;
pub mod edit;
pub mod find;
pub mod hover;
pub mod init;
pub mod navigate;
pub mod rename;
pub mod status;
