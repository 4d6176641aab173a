//! Steward 命令行入口
//!
//! `steward run --goal "..."` 由模型逐步规划；`steward run --plan plan.json` 执行固定计划；
//! `steward tools` 打印按指定格式渲染的工具 schema。

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use steward::config::load_config;
use steward::core::{ShutdownManager, StewardBuilder};
use steward::observability;
use steward::orchestrator::{Action, Plan, SessionEvent, ToolCall};
use steward::tools::Provider;
use tokio::sync::mpsc;

/// Steward - 工具调用编排器
#[derive(Parser)]
#[command(name = "steward", about = "Tool-calling orchestrator for LLM-driven automation")]
struct Cli {
    #[arg(short, long, global = true, help = "Path to config file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Sandbox root for file tools")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one orchestration session and print its report as JSON
    Run {
        /// Goal handed to the model driver
        #[arg(short, long, conflicts_with = "plan", required_unless_present = "plan")]
        goal: Option<String>,

        /// JSON file with a fixed plan: [{"tool": "...", "args": {...}}, ...]
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Tool schema format sent to the model
        #[arg(long)]
        provider: Option<Provider>,

        /// Stream session events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// Print the registered tools rendered for a provider
    Tools {
        #[arg(long, default_value = "openai")]
        provider: Provider,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    observability::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.clone()).context("Failed to load config")?;

    let mut builder = StewardBuilder::new(config);
    if let Some(root) = cli.root {
        builder = builder.with_workspace(root);
    }

    match cli.command {
        Command::Tools { provider } => {
            let registry = builder.build_tool_registry();
            for warning in registry.warnings() {
                tracing::warn!("{}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&registry.render(provider))?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            goal,
            plan,
            provider,
            events,
        } => {
            if let Some(provider) = provider {
                builder = builder.with_schema_format(provider);
            }
            let plan = match (goal, plan) {
                (_, Some(path)) => load_plan(&path)?,
                (Some(goal), None) => Plan::goal(goal),
                (None, None) => anyhow::bail!("either --goal or --plan is required"),
            };

            let mut orchestrator = builder.build();
            if events {
                let (tx, rx) = mpsc::unbounded_channel();
                orchestrator = orchestrator.with_event_tx(tx);
                tokio::spawn(print_events(rx));
            }

            let shutdown = Arc::new(ShutdownManager::new());
            shutdown.install_signal_handlers();

            let report = orchestrator.run(plan, &shutdown.token()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.is_completed() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let calls: Vec<ToolCall> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid plan file {}", path.display()))?;
    Ok(Plan::fixed(calls.into_iter().map(Action::from)))
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("{line}");
        }
    }
}
