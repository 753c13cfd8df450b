//! `convoy chat`: interactive or single-message chat mode.

use convoy_agent::{AgentLoop, StopReason};
use convoy_config::AppConfig;
use convoy_core::message::Message;
use convoy_core::provider::ProviderKind;
use convoy_core::tool::{ToolCall, ToolEventCallback, ToolStatus};
use convoy_providers::router::build_from_config;
use convoy_tools::{RoutingExecutor, workspace_registry};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct ChatOptions {
    pub message: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system: Option<String>,
    pub json: bool,
    pub workspace: Option<PathBuf>,
    pub no_tools: bool,
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = build_from_config(&config)?;
    let name = options
        .provider
        .clone()
        .unwrap_or_else(|| router.default_name().to_string());
    let mut provider_config = router
        .get(Some(name.as_str()))
        .cloned()
        .ok_or_else(|| format!("Unknown provider '{name}'. Run `convoy providers` to list them."))?;
    if let Some(model) = &options.model {
        provider_config.model = model.clone();
    }

    // Check for an API key early and give a clear error
    if provider_config.api_key.is_empty() && provider_config.provider != ProviderKind::Ollama {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{name}'!");
        eprintln!();
        eprintln!("  Set the vendor environment variable (OPENAI_API_KEY, ANTHROPIC_API_KEY,");
        eprintln!("  GEMINI_API_KEY), CONVOY_API_KEY, or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let mut agent = AgentLoop::from_config(provider_config.clone(), &config.agent)?
        .with_json_mode(options.json)
        .with_observer(tool_printer());

    let tool_names = if options.no_tools {
        Vec::new()
    } else {
        let root = match options.workspace {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let registry = workspace_registry(root);
        let names: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
        agent = agent.with_executor(Arc::new(RoutingExecutor::new(registry)));
        names
    };

    let system = options.system.as_deref();

    if let Some(msg) = options.message {
        // Single message mode
        let outcome = agent.run(&msg, &[], system).await?;
        println!("{}", outcome.text);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Convoy: interactive mode");
    println!();
    println!("  Provider:  {name} ({})", provider_config.provider);
    println!("  Model:     {}", provider_config.model);
    if tool_names.is_empty() {
        println!("  Tools:     none");
    } else {
        println!("  Tools:     {}", tool_names.join(", "));
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match agent.run(input, &history, system).await {
            Ok(outcome) => {
                println!();
                for line in outcome.text.lines() {
                    println!("  Assistant > {line}");
                }
                if outcome.stop != StopReason::Completed && outcome.stop != StopReason::Sentinel {
                    tracing::debug!(stop = ?outcome.stop, "Run ended early");
                }
                println!();
                history.push(Message::user(input));
                history.push(Message::assistant(outcome.text));
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Prints tool progress to stderr so stdout stays the answer.
fn tool_printer() -> ToolEventCallback {
    Arc::new(|call: &ToolCall| match call.status {
        ToolStatus::Running => eprintln!("  [tool] {} {}", call.name, call.args),
        ToolStatus::Success => eprintln!(
            "  [tool] {} done ({} ms)",
            call.name,
            call.duration_ms().unwrap_or_default()
        ),
        ToolStatus::Error => eprintln!(
            "  [tool] {} failed: {}",
            call.name,
            call.error.as_deref().unwrap_or("unknown error")
        ),
        ToolStatus::Pending => {}
    })
}
