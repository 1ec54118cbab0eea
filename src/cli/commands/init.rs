//! Init command implementation
//!
//! Initialize a symlens project.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name (defaults to the directory name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Force re-initialization
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Serialize)]
struct InitResponse {
    status: &'static str,
    name: String,
    path: String,
    config_path: String,
    languages: Vec<String>,
}

impl TextOutput for InitResponse {
    fn to_text(&self) -> String {
        format!(
            "Initialized '{}' at {}\nLanguages: {}\nConfig: {}",
            self.name,
            self.path,
            if self.languages.is_empty() {
                "none detected".to_string()
            } else {
                self.languages.join(", ")
            },
            self.config_path
        )
    }
}

pub async fn execute(args: InitArgs, app: &App) -> Result<()> {
    let info = app.project.init(args.name.as_deref(), args.force).await?;

    app.output.print_success(&InitResponse {
        status: "initialized",
        name: info.name,
        path: info.root.display().to_string(),
        config_path: info.config_path.display().to_string(),
        languages: info.languages.iter().map(|l| l.to_string()).collect(),
    });
    Ok(())
}
