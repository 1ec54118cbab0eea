//! Refs and def commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;
use crate::services::symbols::ReferenceLocation;

#[derive(Args, Debug)]
pub struct RefsArgs {
    /// Name path of the symbol ("Config/load")
    pub name_path: String,

    /// File containing the symbol
    pub file: String,

    /// Include the declaration itself
    #[arg(long)]
    pub include_declaration: bool,
}

#[derive(Args, Debug)]
pub struct DefArgs {
    /// Name path of the symbol ("Config/load")
    pub name_path: String,

    /// File containing the symbol
    pub file: String,
}

#[derive(Serialize)]
struct LocationsResponse {
    symbol: String,
    count: usize,
    locations: Vec<ReferenceLocation>,
}

impl TextOutput for LocationsResponse {
    fn to_text(&self) -> String {
        if self.locations.is_empty() {
            return format!("No locations found for {}", self.symbol);
        }
        self.locations
            .iter()
            .map(|l| {
                let (line, column) = l.range.start.to_display();
                format!(
                    "{}:{}:{}  {}",
                    l.relative_path,
                    line,
                    column,
                    l.line_text.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn execute_refs(args: RefsArgs, app: &App) -> Result<()> {
    let locations = app
        .navigator
        .find_references(&args.name_path, &args.file, args.include_declaration)
        .await?;

    app.output.print_success(&LocationsResponse {
        symbol: args.name_path,
        count: locations.len(),
        locations,
    });
    Ok(())
}

pub async fn execute_def(args: DefArgs, app: &App) -> Result<()> {
    let locations = app
        .navigator
        .find_definition(&args.name_path, &args.file)
        .await?;

    app.output.print_success(&LocationsResponse {
        symbol: args.name_path,
        count: locations.len(),
        locations,
    });
    Ok(())
}
