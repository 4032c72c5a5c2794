use anyhow::Result;
use clap::Parser;
use meet_agent::{
    app,
    cli::{handle_meeting_command, handle_relay_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries relay frames, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meet-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Relay(args)) => handle_relay_command(args).await,
        Some(command) => handle_meeting_command(command).await,
        None => app::run_service().await,
    }
}
