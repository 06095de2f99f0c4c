use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::args::Cli;
use cli::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logsub=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli::plain::run(&cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err((message, code)) => {
            eprintln!("{}", message);
            ExitCode::from(code)
        }
    }
}
