use clap::Parser;
use inkstack_auth::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate(args) => cli::migrate::run(args).await,
        Command::PurgeTokens(args) => cli::purge_tokens::run(args).await,
        Command::CheckConfig => cli::check_config::run().await,
        Command::Health => cli::health::run().await,
    }
}
