//! symlens - symbol navigation and editing over language servers

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use symlens::app::App;
use symlens::cli::output::error_code;
use symlens::cli::{Cli, Commands, OutputContext};

fn main() {
    let cli = Cli::parse();

    // Quiet by default; RUST_LOG overrides -v
    let default_filter = match cli.verbose {
        0 => "symlens=warn",
        1 => "symlens=info",
        _ => "symlens=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let fallback = OutputContext::new(cli.format.unwrap_or_default());
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            fallback.print_error("error", &format!("Failed to create runtime: {}", e));
            std::process::exit(2);
        }
    };

    match runtime.block_on(async_main(cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            fallback.print_error(error_code(&e), &format!("{:#}", e));
            std::process::exit(2);
        }
    }
}

/// `Ok(false)` when the command failed after its error was printed
async fn async_main(cli: Cli) -> anyhow::Result<bool> {
    let app = App::new(cli.root, cli.format).await?;

    let result = execute_command(cli.command, &app).await;
    app.shutdown().await;

    match result {
        Ok(()) => Ok(true),
        Err(e) => {
            app.output().print_error(error_code(&e), &format!("{:#}", e));
            Ok(false)
        }
    }
}

async fn execute_command(command: Commands, app: &App) -> anyhow::Result<()> {
    use symlens::cli::commands;

    match command {
        // Project management
        Commands::Init(args) => commands::init::execute(args, app).await,
        Commands::Status(args) => commands::status::execute(args, app).await,
        Commands::Config(args) => commands::config::execute(args, app).await,
        Commands::Cache(args) => commands::cache::execute(args, app).await,

        // Symbol lookup
        Commands::Find(args) => commands::find::execute(args, app).await,
        Commands::Symbols(args) => commands::find::execute_symbols(args, app).await,
        Commands::Refs(args) => commands::navigate::execute_refs(args, app).await,
        Commands::Def(args) => commands::navigate::execute_def(args, app).await,
        Commands::Hover(args) => commands::hover::execute(args, app).await,

        // Editing
        Commands::Edit(args) => commands::edit::execute(args, app).await,
        Commands::Rename(args) => commands::rename::execute(args, app).await,
    }
}
