use std::process;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::generate;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::error;

use rsprovision::cancel::CancellationToken;
use rsprovision::cli::{self, Commands};

/// Raises the token on SIGINT/SIGTERM so the run stops before its next
/// remote command.
fn install_signal_handlers(cancel: &CancellationToken) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag())
            .with_context(|| format!("failed to register handler for signal {}", signal))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    if let Commands::Completions(opts) = &args.command {
        let mut cmd = cli::Cli::command();
        let name = cmd.get_name().to_string();
        generate(opts.shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    if let Some(log_level) = args.command.log_level() {
        rsprovision::init_logging(log_level)?;
    }

    let cancel = CancellationToken::new();
    install_signal_handlers(&cancel)?;

    let result = match &args.command {
        Commands::Provision(opts) => rsprovision::run_provision(opts, cancel),
        Commands::Validate(opts) => rsprovision::run_validate(opts),
        Commands::Detect(opts) => rsprovision::run_detect(opts, cancel),
        Commands::Completions(_) => Ok(()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}
