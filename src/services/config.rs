//! Layered configuration: defaults, global file, project file, environment

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::models::config::SymlensConfig;

const OUTPUT_FORMATS: &[&str] = &["json", "text"];

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Effective configuration; `global_only` skips the project file and environment
    async fn load(&self, global_only: bool) -> Result<SymlensConfig, ConfigError>;
    fn config_path(&self, global: bool) -> PathBuf;
    /// Write a default config file, refusing to overwrite unless `force`
    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError>;
}

pub struct DefaultConfigService {
    root: PathBuf,
    global_path: PathBuf,
}

impl DefaultConfigService {
    pub fn new(root: &Path) -> Self {
        Self::with_global_path(root, Self::global_config_path())
    }

    pub fn with_global_path(root: &Path, global_path: PathBuf) -> Self {
        Self {
            root: root.to_path_buf(),
            global_path,
        }
    }

    /// `$XDG_CONFIG_HOME/symlens/config.toml`, falling back to `~/.config`
    fn global_config_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("symlens")
            .join("config.toml")
    }

    fn project_config_path(&self) -> PathBuf {
        self.root.join(".symlens").join("config.toml")
    }

    /// Raw table from `path`; an absent file is an empty table
    async fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
        if !path.exists() {
            return Ok(toml::Table::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    async fn write_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(&SymlensConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    async fn load(&self, global_only: bool) -> Result<SymlensConfig, ConfigError> {
        let mut table = Self::load_table(&self.global_path).await?;
        if !global_only {
            let project = Self::load_table(&self.project_config_path()).await?;
            merge_tables(&mut table, project);
        }

        let mut config: SymlensConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        if !global_only {
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        }
        validate(&config)?;
        Ok(config)
    }

    fn config_path(&self, global: bool) -> PathBuf {
        if global {
            self.global_path.clone()
        } else {
            self.project_config_path()
        }
    }

    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError> {
        let path = self.config_path(global);

        if path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                key: "config".to_string(),
                message: format!(
                    "Config already exists: {}. Use --force to overwrite.",
                    path.display()
                ),
            });
        }

        Self::write_default_config(&path).await?;
        tracing::info!("Wrote default config to {}", path.display());
        Ok(path)
    }
}

/// Overlay `overlay` onto `base`; nested tables merge key by key, anything else replaces
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(
    config: &mut SymlensConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(val) = env("SYMLENS_OUTPUT_FORMAT") {
        config.output.format = val;
    }
    if let Some(val) = env("SYMLENS_LSP_TIMEOUT") {
        config.lsp.timeout_secs = parse_env("SYMLENS_LSP_TIMEOUT", &val)?;
    }
    if let Some(val) = env("SYMLENS_CACHE_ENABLED") {
        config.cache.enabled = parse_env("SYMLENS_CACHE_ENABLED", &val)?;
    }
    if let Some(val) = env("SYMLENS_AUTO_INSTALL") {
        config.lsp.auto_install = parse_env("SYMLENS_AUTO_INSTALL", &val)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}

fn validate(config: &SymlensConfig) -> Result<(), ConfigError> {
    if !OUTPUT_FORMATS.contains(&config.output.format.as_str()) {
        return Err(ConfigError::InvalidValue {
            key: "output.format".to_string(),
            message: format!(
                "'{}' is not one of {}",
                config.output.format,
                OUTPUT_FORMATS.join(", ")
            ),
        });
    }
    if config.lsp.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "lsp.timeout_secs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
