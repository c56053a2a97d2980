//! NanoForge CLI
//!
//! Argument parsing, wiring, and the interactive REPL. One-shot mode runs a
//! single prompt and exits; with no prompt the CLI reads lines from stdin
//! until `exit`/`quit` or EOF. Ctrl+C sets the loop's interrupt flag so the
//! current run stops at the next turn boundary.

use std::io::{BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;

use nanoforge::agent::AgentLoop;
use nanoforge::bus::{EventBus, EventLogger};
use nanoforge::config::Config;
use nanoforge::permissions::PermissionEngine;
use nanoforge::provider::ClaudeProvider;
use nanoforge::tools::{default_registry, TodoManager, TodoWriteTool, ToolExecutor};
use nanoforge::utils::init_logging;

/// Ultra-lightweight terminal coding agent
#[derive(Debug, Parser)]
#[command(name = "nanoforge", version, about)]
struct Cli {
    /// Prompt to run. Omit for interactive mode.
    prompt: Vec<String>,

    /// Model identifier override
    #[arg(long)]
    model: Option<String>,

    /// Turn budget override
    #[arg(long)]
    max_turns: Option<usize>,

    /// Disable the permission gate (auto-approve everything)
    #[arg(long)]
    no_approval: bool,

    /// Verbose event logging (state transitions, etc.)
    #[arg(short, long)]
    verbose: bool,
}

/// CLI entry point.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load();
    if let Some(model) = &cli.model {
        config.set("model", json!(model));
    }
    if let Some(max_turns) = cli.max_turns {
        config.set("max_turns", json!(max_turns));
    }
    if cli.no_approval {
        config.set("approval_enabled", json!(false));
    }

    init_logging(if config.debug() { "debug" } else { "info" });

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY is not set (export it or put it in .env)")?;
    if api_key.is_empty() {
        bail!("ANTHROPIC_API_KEY is empty");
    }

    let provider = Arc::new(ClaudeProvider::new(&api_key, &config.model()));

    // The todo manager is shared between the tool and the REPL status line
    // by constructor injection, not via a global.
    let todos = Arc::new(TodoManager::new());
    let mut registry = default_registry(&config);
    registry.register(Box::new(TodoWriteTool::new(todos.clone())));

    let executor = ToolExecutor::new(registry)
        .with_permission_engine(PermissionEngine::from_config(&config));
    let bus = Arc::new(EventBus::new());

    let mut logger = EventLogger::new(cli.verbose || config.debug());
    logger.attach(&bus);

    let mut agent = AgentLoop::new(provider, executor, bus, &config);

    // Ctrl+C sets the interrupt flag; the run stops at the next turn
    // boundary instead of killing the process.
    let interrupt = agent.interrupt_flag();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            eprintln!("\n[interrupt requested - finishing current step]");
            interrupt.store(true, Ordering::SeqCst);
        }
    });

    if !cli.prompt.is_empty() {
        let prompt = cli.prompt.join(" ");
        let response = agent.run(&prompt).await?;
        println!("{}", response);
        return Ok(());
    }

    repl(&mut agent, &todos).await
}

/// Interactive read-eval loop over stdin.
async fn repl(agent: &mut AgentLoop, todos: &TodoManager) -> anyhow::Result<()> {
    eprintln!("nanoforge interactive mode - 'exit' to quit, 'reset' to clear the session");
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        eprint!("you> ");
        std::io::stderr().flush().ok();
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "exit" | "quit" => break,
            "reset" => {
                agent.reset();
                eprintln!("[session cleared]");
                continue;
            }
            _ => {}
        }

        match agent.run(input).await {
            Ok(response) => println!("{}", response),
            // Provider failures end the run, not the REPL
            Err(e) => eprintln!("error: {}", e),
        }

        if let Some(task) = todos.current_task() {
            eprintln!("[in progress: {}]", task);
        }
    }

    Ok(())
}
