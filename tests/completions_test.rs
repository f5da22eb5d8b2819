//! Tests for shell completion functionality.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use clap_complete::Shell;
use rsprovision::cli::{Cli, Commands};

/// Test parsing the completions command for all supported shells.
#[test]
fn test_completions_command_parsing() -> Result<()> {
    let shells = [
        ("bash", Shell::Bash),
        ("zsh", Shell::Zsh),
        ("fish", Shell::Fish),
        ("powershell", Shell::PowerShell),
        ("elvish", Shell::Elvish),
    ];

    for (shell_str, expected_shell) in shells {
        let args = Cli::parse_from(["rsprovision", "completions", shell_str]);
        match &args.command {
            Commands::Completions(opts) => {
                assert_eq!(opts.shell, expected_shell, "Mismatched shell for '{}'", shell_str);
            }
            _ => panic!("Expected Completions command for shell '{}'", shell_str),
        }
        assert_eq!(args.command.log_level(), None);
    }

    Ok(())
}

/// Test that completion generation produces output mentioning every subcommand.
#[test]
fn test_completions_generation() -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::generate;

    let mut cmd = Cli::command();
    let mut buffer = Vec::new();

    for shell in Shell::value_variants() {
        buffer.clear();
        generate(*shell, &mut cmd, "rsprovision", &mut buffer);
        assert!(!buffer.is_empty(), "Generated completion for {:?} was empty", shell);
    }

    buffer.clear();
    generate(Shell::Bash, &mut cmd, "rsprovision", &mut buffer);
    let script = String::from_utf8(buffer)?;
    for subcommand in ["provision", "validate", "detect", "completions"] {
        assert!(script.contains(subcommand), "bash completion lacks {}", subcommand);
    }

    Ok(())
}

#[test]
fn test_completions_rejects_unknown_shell() {
    let result = Cli::try_parse_from(["rsprovision", "completions", "tcsh"]);
    assert!(result.is_err());
}
