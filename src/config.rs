//! Process-wide runtime settings

use std::sync::OnceLock;
use std::time::Duration;

use crate::models::config::SymlensConfig;
use crate::models::symbol::Language;

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Per-language slowness factor applied to every request deadline.
pub fn timeout_multiplier(language: Language) -> f64 {
    match language {
        // JVM servers resolve Gradle/Maven graphs before answering
        Language::Java | Language::Kotlin => 4.0,
        Language::Python | Language::TypeScript | Language::JavaScript => 2.5,
        Language::Rust | Language::Cpp | Language::CSharp => 1.5,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Request,
    WorkspaceOperation,
    Rename,
    Initialization,
    Shutdown,
}

impl OperationType {
    pub fn from_method(method: &str) -> Self {
        match method {
            "textDocument/rename" => Self::Rename,
            "textDocument/references" => Self::WorkspaceOperation,
            "initialize" => Self::Initialization,
            "shutdown" => Self::Shutdown,
            _ => Self::Request,
        }
    }

    fn base_multiplier(self) -> f64 {
        match self {
            Self::Request => 1.0,
            Self::WorkspaceOperation => 4.0,
            Self::Rename => 6.0,
            Self::Initialization => 2.0,
            Self::Shutdown => 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    base_timeout: Duration,
    pub auto_restart: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(30),
            auto_restart: true,
        }
    }
}

impl From<&SymlensConfig> for RuntimeConfig {
    fn from(config: &SymlensConfig) -> Self {
        Self {
            base_timeout: Duration::from_secs(config.lsp.timeout_secs),
            auto_restart: config.lsp.auto_restart,
        }
    }
}

impl RuntimeConfig {
    pub fn timeout_for(&self, language: Language, method: &str) -> Duration {
        let multiplier =
            timeout_multiplier(language) * OperationType::from_method(method).base_multiplier();
        Duration::from_secs_f64(self.base_timeout.as_secs_f64() * multiplier)
    }
}

pub fn init(config: &SymlensConfig) {
    let _ = CONFIG.set(RuntimeConfig::from(config));
}

pub fn timeout_for(language: Language, method: &str) -> Duration {
    config().timeout_for(language, method)
}

pub fn auto_restart() -> bool {
    config().auto_restart
}

fn config() -> RuntimeConfig {
    CONFIG.get().cloned().unwrap_or_default()
}
