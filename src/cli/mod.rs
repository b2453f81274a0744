//! Command-line interface for the `sluice` binary.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Sluice streaming agent loop
#[derive(Parser, Debug)]
#[command(name = "sluice", version, about = "Sluice: streaming agent loop for tool-calling models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the NDJSON chat endpoint
    Serve(ServeArgs),
    /// Run one prompt through the agent loop and print the reply
    Chat(ChatArgs),
}

/// Arguments shared by every command that talks to a model.
#[derive(Parser, Debug, Clone)]
pub struct ModelArgs {
    /// Model to use (provider:model, e.g. anthropic:claude-sonnet-4-5)
    #[arg(short, long, env = "SLUICE_MODEL")]
    pub model: Option<String>,

    /// Maximum upstream calls per run
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SLUICE_CONFIG")]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub addr: SocketAddr,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Parser, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens per upstream call
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// User prompt
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_with_defaults() {
        let cli = Cli::try_parse_from(["sluice", "serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.addr, "127.0.0.1:8787".parse::<SocketAddr>().unwrap());
                assert!(args.model.max_iterations.is_none());
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "sluice",
            "chat",
            "-m",
            "openai:gpt-4o",
            "-s",
            "You are terse",
            "-t",
            "0.2",
            "--max-tokens",
            "256",
            "--max-iterations",
            "3",
            "what time is it?",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.model.model.as_deref(), Some("openai:gpt-4o"));
                assert_eq!(args.model.max_iterations, Some(3));
                assert_eq!(args.system.as_deref(), Some("You are terse"));
                assert_eq!(args.max_tokens, Some(256));
                assert_eq!(args.prompt, "what time is it?");
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn chat_requires_a_prompt() {
        assert!(Cli::try_parse_from(["sluice", "chat"]).is_err());
    }

    #[test]
    fn missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["sluice"]).is_err());
    }
}
