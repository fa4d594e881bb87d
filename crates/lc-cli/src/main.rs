//! LoadCast command-line entry point.

mod cli;

use clap::Parser;
use cli::{cmd_features, cmd_tune, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadcast=info,lc_optimizer=info,lc_data=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Features(args) => cmd_features(&args)?,
        Commands::Tune(args) => {
            let best = cmd_tune(&args)?;
            println!("{}", serde_json::to_string_pretty(&best)?);
        }
    }

    Ok(())
}
