//! Service layer for symlens

pub mod config;
pub mod project;
pub mod symbols;

pub use config::{ConfigService, DefaultConfigService};
pub use project::{DefaultProjectService, ProjectService};
