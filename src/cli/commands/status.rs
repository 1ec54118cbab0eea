//! Status command implementation
//!
//! Show project status, language server availability and cache statistics.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;
use crate::infra::lsp::ServerStatus;
use crate::services::symbols::CacheStats;

#[derive(Args, Debug)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct StatusResponse {
    initialized: bool,
    root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    languages: Vec<ServerStatusOutput>,
    cache: CacheStats,
}

#[derive(Serialize)]
struct ServerStatusOutput {
    language: String,
    status: &'static str,
    detail: String,
}

impl TextOutput for StatusResponse {
    fn to_text(&self) -> String {
        let mut lines = vec![
            format!(
                "Project: {} ({})",
                self.name.as_deref().unwrap_or("not initialized"),
                self.root
            ),
            format!(
                "Cache: {} in memory, {} on disk, hit rate {:.0}%",
                self.cache.memory_entries,
                self.cache.disk_entries,
                self.cache.hit_rate * 100.0
            ),
        ];
        if self.languages.is_empty() {
            lines.push("No languages detected".to_string());
        }
        lines.extend(
            self.languages
                .iter()
                .map(|s| format!("  {:<12} {}", s.language, s.detail)),
        );
        lines.join("\n")
    }
}

fn status_label(status: &ServerStatus) -> &'static str {
    match status {
        ServerStatus::Running { .. } => "running",
        ServerStatus::Stopped { .. } => "available",
        ServerStatus::Downloadable { .. } => "downloadable",
        ServerStatus::NotInstalled { .. } => "not_installed",
        ServerStatus::NotSupported => "not_supported",
    }
}

pub async fn execute(_args: StatusArgs, app: &App) -> Result<()> {
    let status = app.project.status().await?;

    let mut languages = Vec::new();
    for language in app.project.languages() {
        let server = app.manager.server_status(*language).await;
        languages.push(ServerStatusOutput {
            language: language.to_string(),
            status: status_label(&server),
            detail: server.to_string(),
        });
    }

    let response = StatusResponse {
        initialized: status.initialized,
        root: app.root().display().to_string(),
        name: status.project.map(|p| p.name),
        languages,
        cache: app.cache.stats().await,
    };

    app.output.print_success(&response);
    Ok(())
}
