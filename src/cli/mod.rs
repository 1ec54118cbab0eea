//! CLI module for symlens
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;
pub mod output;

pub use output::{OutputContext, OutputFormat, TextOutput};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{
    cache::CacheArgs,
    config::ConfigArgs,
    edit::EditArgs,
    find::{FindArgs, SymbolsArgs},
    hover::HoverArgs,
    init::InitArgs,
    navigate::{DefArgs, RefsArgs},
    rename::RenameArgs,
    status::StatusArgs,
};

const LONG_ABOUT: &str = r#"
symlens - symbol navigation and editing over language servers

Symbols are addressed by name path: the chain of enclosing symbol names joined
with '/'. A leading '/' anchors the path at the top level of a file; otherwise it
matches the last segments of a symbol's path.

QUICK START:
  1. Initialize a project:    symlens init
  2. Outline a file:          symlens symbols main.tf --depth 1
  3. Find symbols:            symlens find 'Config/load'
  4. Get references:          symlens refs 'Config/load' src/config.py

EDIT EXAMPLES:
  symlens edit replace-body 'Config/load' src/config.py --content-file new_body.py
  symlens edit insert-after '/Config' src/config.py --content 'DEFAULTS = {}'
  symlens rename 'Config/load' src/config.py load_file

Lines in CLI arguments are 1-based and inclusive.
"#;

/// symlens - symbol navigation and editing over language servers
#[derive(Parser, Debug)]
#[command(name = "symlens")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'symlens <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json, text); defaults to output.format from config
    #[arg(long, global = true, env = "SYMLENS_OUTPUT_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Project root (defaults to current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a symlens project
    Init(InitArgs),

    /// Show project, server and cache status
    Status(StatusArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Symbol cache management
    Cache(CacheArgs),

    /// Find symbols by name path across files
    Find(FindArgs),

    /// List the symbols of a file
    Symbols(SymbolsArgs),

    /// Find references to a symbol
    Refs(RefsArgs),

    /// Go to the definition of a symbol
    Def(DefArgs),

    /// Show hover information for a symbol
    Hover(HoverArgs),

    /// Symbol- and line-relative editing
    Edit(EditArgs),

    /// Rename a symbol across the codebase
    Rename(RenameArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "symlens", "find", "Config/load", "--format", "text", "-vv", "--root", "/tmp/p",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Text));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/p")));
        assert!(matches!(cli.command, Commands::Find(_)));
    }

    #[test]
    fn test_parse_edit_line_range() {
        let cli = Cli::try_parse_from([
            "symlens", "edit", "delete-lines", "main.tf", "3", "5",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Edit(_)));
        assert!(Cli::try_parse_from(["symlens", "edit", "delete-lines", "main.tf", "x", "5"]).is_err());
    }
}
