use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the host described by the given profile
    Provision(ProvisionArgs),

    /// Validate the given YAML profile
    Validate(ValidateArgs),

    /// Print the operating system reported by the host
    Detect(DetectArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

/// Arguments shared by every profile-driven subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the YAML file defining the profile
    #[arg(short, long, default_value = "profile.yml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Do not run, just show what would be done
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// Maps directly onto the `tracing` levels. `--log-level debug` adds the
/// per-step and per-probe lines, `trace` adds every remote command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Commands {
    /// The log level requested on the command line, if the subcommand has one.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self {
            Commands::Provision(opts) => Some(opts.common.log_level),
            Commands::Validate(opts) => Some(opts.common.log_level),
            Commands::Detect(opts) => Some(opts.common.log_level),
            Commands::Completions(_) => None,
        }
    }
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
