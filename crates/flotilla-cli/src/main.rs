//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};

use flotilla_cli::{Cli, CliConfig, Commands, bootstrap, handlers, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads FLOTILLA_MANIFEST
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::resolve(cli.manifest)?;
    let ctx = bootstrap(config)?;

    match command {
        Commands::List => handlers::list::execute(&ctx),
        Commands::Up {
            stdio,
            health_interval,
        } => handlers::up::execute(&ctx, stdio, health_interval).await,
        Commands::Check => handlers::check::execute(&ctx).await,
    }
}
