//! Config command implementation

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;
use crate::models::config::SymlensConfig;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Initialize configuration file
    Init {
        /// Initialize global config (~/.config/symlens)
        #[arg(long)]
        global: bool,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Show global config only
        #[arg(long)]
        global: bool,
    },

    /// Show config file path
    Path {
        /// Show global config path
        #[arg(long)]
        global: bool,
    },
}

fn level(global: bool) -> &'static str {
    if global { "global" } else { "project" }
}

#[derive(Serialize)]
struct ConfigInitResponse {
    status: &'static str,
    path: String,
    level: &'static str,
}

impl TextOutput for ConfigInitResponse {
    fn to_text(&self) -> String {
        format!("Created {} config at {}", self.level, self.path)
    }
}

#[derive(Serialize)]
struct ConfigShowResponse {
    level: &'static str,
    config: SymlensConfig,
}

impl TextOutput for ConfigShowResponse {
    fn to_text(&self) -> String {
        toml::to_string_pretty(&self.config).unwrap_or_else(|e| format!("<unprintable: {}>", e))
    }
}

#[derive(Serialize)]
struct ConfigPathResponse {
    level: &'static str,
    path: String,
    exists: bool,
}

impl TextOutput for ConfigPathResponse {
    fn to_text(&self) -> String {
        if self.exists {
            self.path.clone()
        } else {
            format!("{} (not created)", self.path)
        }
    }
}

pub async fn execute(args: ConfigArgs, app: &App) -> Result<()> {
    let ctx = &app.output;

    match args.command {
        ConfigCommand::Init { global, force } => {
            let path = app.config_service.init(global, force).await?;
            ctx.print_success(&ConfigInitResponse {
                status: "created",
                path: path.display().to_string(),
                level: level(global),
            });
        }

        ConfigCommand::Show { global } => {
            let config = app.config_service.load(global).await?;
            ctx.print_success(&ConfigShowResponse {
                level: if global { "global" } else { "merged" },
                config,
            });
        }

        ConfigCommand::Path { global } => {
            let path = app.config_service.config_path(global);
            ctx.print_success(&ConfigPathResponse {
                level: level(global),
                exists: path.exists(),
                path: path.display().to_string(),
            });
        }
    }

    Ok(())
}
