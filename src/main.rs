//! Sluice CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use sluice::agent_loop::{AgentLoop, ChatRequest, RunStatus};
use sluice::cli::{ChatArgs, Cli, Commands, ModelArgs, ServeArgs};
use sluice::config::SluiceConfig;
use sluice::downstream::{self, DownstreamFrame};
use sluice::tools::builtin;
use sluice::types::{ConversationTurn, GenerationSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => handle_serve(args).await,
        Commands::Chat(args) => handle_chat(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build_agent(args: &ModelArgs) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SluiceConfig::from_file(path)?.with_env_overrides(),
        None => SluiceConfig::load()?,
    };
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    let mut limits = config.limits();
    if let Some(max) = args.max_iterations {
        if max == 0 {
            return Err("--max-iterations must be positive".into());
        }
        limits.max_iterations = max;
    }

    let model = config.model()?;
    let provider = sluice::provider::create_provider(&model, &config)?;
    Ok(AgentLoop::new(Arc::from(provider), Arc::new(builtin::default_registry())).with_limits(limits))
}

async fn handle_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let agent = build_agent(&args.model)?;
    sluice::server::serve(agent, args.addr).await?;
    Ok(())
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let agent = build_agent(&args.model)?;

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ConversationTurn::system(system));
    }
    messages.push(ConversationTurn::user(args.prompt));

    let settings = GenerationSettings {
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        ..GenerationSettings::default()
    };
    let request = ChatRequest::new(uuid::Uuid::new_v4().to_string(), messages)
        .with_caller("cli")
        .with_settings(settings);

    let (sink, mut frames) = downstream::channel(64);
    let run = tokio::spawn(async move { agent.run(request, sink).await });

    let mut stdout = std::io::stdout();
    while let Some(frame) = frames.recv().await {
        match frame {
            DownstreamFrame::TextDelta { delta, .. } => {
                print!("{delta}");
                let _ = stdout.flush();
            }
            DownstreamFrame::ToolOutput { tool_name, output, .. } => {
                eprintln!("\n[{tool_name}] {output}");
            }
            DownstreamFrame::Error { error_text } => eprintln!("\n{error_text}"),
            DownstreamFrame::TextStart { .. } | DownstreamFrame::TextEnd { .. } => {}
        }
    }
    println!();

    let summary = run.await?;
    match summary.status {
        RunStatus::Failed => Err(summary.error.unwrap_or_else(|| "run failed".into()).into()),
        RunStatus::IterationLimit => {
            eprintln!("(stopped after {} iterations)", summary.iterations);
            Ok(())
        }
        _ => Ok(()),
    }
}
