//! Configuration model for symlens

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::symbol::Language;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SymlensConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub lsp: LspConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub editor: EditorConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: Option<String>,

    /// Languages to serve; detected from file extensions when empty
    #[serde(default)]
    pub languages: Vec<Language>,

    #[serde(default = "default_ignored_paths")]
    pub ignored_paths: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            languages: Vec::new(),
            ignored_paths: default_ignored_paths(),
        }
    }
}

fn default_ignored_paths() -> Vec<String> {
    [".git", ".symlens", "node_modules", "target", "dist", "build"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspConfig {
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::enabled")]
    pub auto_restart: bool,

    /// Download servers that ship a release archive when not found locally
    #[serde(default = "defaults::enabled")]
    pub auto_install: bool,

    /// Per-language command overrides, keyed by language id (`terraform`, `rust`, ...)
    #[serde(default)]
    pub servers: HashMap<String, ServerOverride>,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout_secs(),
            auto_restart: defaults::enabled(),
            auto_install: defaults::enabled(),
            servers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerOverride {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "defaults::max_file_size_mb")]
    pub max_file_size_mb: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: defaults::max_file_size_mb(),
        }
    }
}

impl EditorConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        if self.max_file_size_mb == 0 {
            u64::MAX
        } else {
            self.max_file_size_mb as u64 * 1024 * 1024
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: defaults::format(),
        }
    }
}

mod defaults {
    pub fn timeout_secs() -> u64 {
        30
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn max_file_size_mb() -> u32 {
        5
    }
    pub fn format() -> String {
        "json".to_string()
    }
}
