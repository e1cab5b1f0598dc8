//! CLI parsing tests for llmctl

use clap::Parser;
use llm_common::DEFAULT_API_URL;
use llmctl::cli::{Cli, Commands};

#[test]
fn test_status_without_name() {
    let cli = Cli::try_parse_from(["llmctl", "status"]).unwrap();
    assert_eq!(cli.command, Commands::Status { name: None });
    assert_eq!(cli.url, DEFAULT_API_URL);
    assert!(!cli.json);
}

#[test]
fn test_status_with_name() {
    let cli = Cli::try_parse_from(["llmctl", "status", "ollama"]).unwrap();
    assert_eq!(
        cli.command,
        Commands::Status {
            name: Some("ollama".to_string())
        }
    );
}

#[test]
fn test_lifecycle_commands() {
    let name = || "nllb".to_string();
    let cases = [
        ("start", Commands::Start { name: name() }),
        ("stop", Commands::Stop { name: name() }),
        ("restart", Commands::Restart { name: name() }),
    ];
    for (verb, expected) in cases {
        let cli = Cli::try_parse_from(["llmctl", verb, "nllb"]).unwrap();
        assert_eq!(cli.command, expected);
    }
}

#[test]
fn test_lifecycle_requires_name() {
    assert!(Cli::try_parse_from(["llmctl", "start"]).is_err());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli =
        Cli::try_parse_from(["llmctl", "health", "--url", "http://10.0.0.5:7999", "--json"]).unwrap();
    assert_eq!(cli.command, Commands::Health);
    assert_eq!(cli.url, "http://10.0.0.5:7999");
    assert!(cli.json);
}
