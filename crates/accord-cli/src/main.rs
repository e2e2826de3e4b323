use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
    commands::run_command(cli)
}
