//! Find and symbols commands
//!
//! Name-path lookup across the project and per-file outlines.

use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::output::symbol_tree_text;
use crate::cli::TextOutput;
use crate::models::symbol::{SymbolKind, SymbolNode};
use crate::services::symbols::FindOptions;

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Name path pattern ("load", "Config/load", "/Config")
    pub pattern: String,

    /// File or directory to search (whole project by default)
    #[arg(short, long)]
    pub within: Option<String>,

    /// Match the last pattern segment as a substring
    #[arg(long)]
    pub substring: bool,

    /// Only these symbol kinds, comma-separated (function,class,method)
    #[arg(long, value_delimiter = ',')]
    pub kind: Vec<SymbolKind>,

    /// Exclude these symbol kinds, comma-separated (variable,constant)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<SymbolKind>,

    /// Include symbol bodies (source text)
    #[arg(short, long)]
    pub body: bool,

    /// Include children down to this depth (0 = matched symbols only)
    #[arg(short, long, default_value_t = 0)]
    pub depth: usize,
}

#[derive(Args, Debug)]
pub struct SymbolsArgs {
    /// File to outline
    pub file: String,

    /// Include children down to this depth (0 = top-level only)
    #[arg(short, long, default_value_t = 0)]
    pub depth: usize,
}

#[derive(Serialize)]
struct SymbolsResponse {
    count: usize,
    symbols: Vec<SymbolNode>,
}

impl TextOutput for SymbolsResponse {
    fn to_text(&self) -> String {
        if self.symbols.is_empty() {
            return "No symbols found".to_string();
        }
        let mut out = symbol_tree_text(&self.symbols);
        for symbol in self.symbols.iter().filter(|s| !s.body.is_empty()) {
            let _ = write!(out, "\n--- {} ({})\n{}\n", symbol.name_path, symbol.location(), symbol.body);
        }
        out
    }
}

pub async fn execute(args: FindArgs, app: &App) -> Result<()> {
    let options = FindOptions {
        within: args.within,
        substring: args.substring,
        include_kinds: args.kind,
        exclude_kinds: args.exclude,
    };

    let found = app.matcher.find_symbols_by_name(&args.pattern, &options).await?;
    let symbols: Vec<SymbolNode> = found
        .iter()
        .map(|symbol| {
            let mut shaped = symbol.outline(args.depth);
            if args.body {
                shaped.body = symbol.body.clone();
            }
            shaped
        })
        .collect();

    app.output.print_success(&SymbolsResponse {
        count: symbols.len(),
        symbols,
    });
    Ok(())
}

pub async fn execute_symbols(args: SymbolsArgs, app: &App) -> Result<()> {
    let symbols = app
        .normalizer
        .get_symbols_overview(&args.file, args.depth)
        .await?;

    app.output.print_success(&SymbolsResponse {
        count: symbols.len(),
        symbols,
    });
    Ok(())
}
