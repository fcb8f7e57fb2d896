pub mod logging;
pub mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use logging::LogTarget;
use parley_common::ParleyConfig;
use parley_core::{
    ChatTransport, ConversationController, ConversationLimits, EchoTransport, HttpTransport, Role,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal chat client for a single-endpoint chatbot API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the API base URL (e.g., http://127.0.0.1:8000/api/v1)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Answer locally with an echo instead of calling the API
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send one message and print the reply
    Send {
        message: String,
    },
    /// Run a local echo backend
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration
    Config,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ParleyConfig) {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(timeout) = self.timeout_ms {
            config.request_timeout_ms = timeout;
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ParleyConfig::load_from(path).await?,
        None => ParleyConfig::load().await?,
    };
    config.apply_env();
    cli.apply_overrides(&mut config);

    let command = cli.command.as_ref().unwrap_or(&Commands::Chat);
    let target = match command {
        Commands::Chat => LogTarget::File(config.log_path_or_default()),
        _ => LogTarget::Stderr,
    };
    logging::init(cli.debug, target)?;

    match command {
        Commands::Chat => {
            info!(api_url = %config.api_url, offline = cli.offline, "starting chat");
            parley_tui::run_chat(|| build_controller(&config, cli.offline)).await?;
        }
        Commands::Send { message } => {
            let controller = build_controller(&config, cli.offline)?;
            if let Some(reply) = send_once(&controller, message).await {
                println!("{reply}");
            }
        }
        Commands::Serve { host, port } => {
            let mut server = config.server.clone();
            if let Some(host) = host {
                server.host = host.clone();
            }
            if let Some(port) = port {
                server.port = *port;
            }
            serve::serve(&server, config.max_message_chars).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_transport(config: &ParleyConfig, offline: bool) -> Result<Arc<dyn ChatTransport>> {
    if offline {
        return Ok(Arc::new(EchoTransport));
    }
    Ok(Arc::new(HttpTransport::from_config(config)?))
}

pub fn build_controller(config: &ParleyConfig, offline: bool) -> Result<ConversationController> {
    let transport = build_transport(config, offline)?;
    Ok(ConversationController::new(
        transport,
        ConversationLimits::from(config),
    ))
}

/// Run one exchange and return the assistant's last word, if any
pub async fn send_once(controller: &ConversationController, message: &str) -> Option<String> {
    controller.send_message(message).await;
    controller
        .messages()
        .iter()
        .rev()
        .find(|m| m.role() == Role::Assistant)
        .map(|m| m.content().to_string())
}
