// src/main.rs
// askcfo - finance assistant chat with delegated tool execution

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use askcfo::agent;
use askcfo::chat::provider::DeepSeekProvider;
use askcfo::chat::{ChatEngine, ChatSession, EngineConfig};
use askcfo::config::AppConfig;
use askcfo::gateway::ToolGateway;
use askcfo::logging::{self, LoggingBridge};
use askcfo::protocol::{DirectiveCodec, HideToggle};
use askcfo::terminal;

#[derive(Parser)]
#[command(name = "askcfo")]
#[command(about = "Chat with a finance assistant that can delegate tasks to a tool agent", long_about = None)]
struct Cli {
    /// Strip [[TOOLS:...]] directives from displayed replies
    #[arg(long, global = true)]
    hide_tools: bool,

    /// Log at DEBUG instead of INFO
    #[arg(long, global = true)]
    debug: bool,

    /// Seconds to wait for a tool run before giving up
    #[arg(long, global = true)]
    tool_timeout: Option<u64>,

    /// Directory for log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat,
    /// Ask one question and print the final reply
    Ask {
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if cli.hide_tools {
        config.hide_tools = true;
    }
    if let Some(secs) = cli.tool_timeout {
        config.tool_timeout_secs = secs;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = dir;
    }

    let (registry, layout) = logging::init(&config.log_dir, cli.debug)?;
    info!(log_file = %layout.main_file.display(), "Application started");
    info!(log_file = %layout.agent_file.display(), "Agent log file opened");
    info!(
        model = %config.model,
        agent_mode = %config.agent_mode,
        tool_timeout_secs = config.tool_timeout_secs,
        "Configuration loaded"
    );
    if !config.has_api_key() {
        warn!("DEEPSEEK_API_KEY is not set; completions will fail");
    }

    let hide = HideToggle::new(config.hide_tools);
    let gateway = ToolGateway::new(agent::factory_from_config(&config))
        .with_bridge(LoggingBridge::new(registry))
        .with_timeout(config.tool_timeout());

    let engine = ChatEngine::new(
        Arc::new(DeepSeekProvider::from_config(&config)),
        Arc::new(gateway),
        DirectiveCodec::new(hide.clone()),
        EngineConfig::from_app(&config),
    );
    let session = Arc::new(ChatSession::new());

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => terminal::run_repl(engine, session, hide).await?,
        Command::Ask { message } => {
            let message = message.join(" ");
            if let Some(update) = engine.submit(session, message).await {
                if let Some(reply) = update.transcript.last() {
                    println!("{}", reply.content);
                }
            }
        }
    }

    Ok(())
}
