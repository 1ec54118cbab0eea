//! Cache command implementation

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;
use crate::services::symbols::CacheStats;

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache statistics
    Stats,

    /// Remove every cached entry, in memory and on disk
    Clear,
}

#[derive(Serialize)]
struct StatsResponse {
    enabled: bool,
    #[serde(flatten)]
    stats: CacheStats,
}

impl TextOutput for StatsResponse {
    fn to_text(&self) -> String {
        if !self.enabled {
            return "Cache disabled".to_string();
        }
        format!(
            "memory entries: {}\ndisk entries:   {}\nhits/misses:    {}/{}",
            self.stats.memory_entries, self.stats.disk_entries, self.stats.hits, self.stats.misses
        )
    }
}

#[derive(Serialize)]
struct ClearResponse {
    status: &'static str,
}

impl TextOutput for ClearResponse {
    fn to_text(&self) -> String {
        "Cache cleared".to_string()
    }
}

pub async fn execute(args: CacheArgs, app: &App) -> Result<()> {
    match args.command {
        CacheCommand::Stats => {
            app.output.print_success(&StatsResponse {
                enabled: app.config().cache.enabled,
                stats: app.cache.stats().await,
            });
        }
        CacheCommand::Clear => {
            app.cache.clear().await.context("Failed to clear cache")?;
            app.output.print_success(&ClearResponse { status: "cleared" });
        }
    }
    Ok(())
}
