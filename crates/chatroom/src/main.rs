use anyhow::{Context, Result};
use chatroom_core::{ChannelSink, ChatConfig, ChatSession, JoinResult};
use clap::Parser;
use dice_client::{MemoryStore, StoreClient, TcpStoreClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod terminal;

use terminal::{ExitCause, Terminal};

#[derive(Parser, Debug)]
#[command(name = "chatroom")]
#[command(about = "Terminal chat room over a DiceDB mailbox key", long_about = None)]
struct Cli {
    /// Display name shown before every message
    name: Option<String>,

    /// DiceDB host
    #[arg(long)]
    host: Option<String>,

    /// DiceDB port
    #[arg(short, long)]
    port: Option<u16>,

    /// Mailbox key shared by all participants
    #[arg(short, long)]
    key: Option<String>,

    /// Config file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-process store instead of a server
    #[arg(long)]
    local: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "chatroom.log".into());
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<ChatConfig> {
    let mut config = match cli.config.clone().or_else(ChatConfig::default_path) {
        Some(path) => ChatConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ChatConfig::default(),
    };

    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if let Some(host) = &cli.host {
        config.store.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.store.port = port;
    }
    if let Some(key) = &cli.key {
        config.mailbox_key = key.clone();
    }
    Ok(config)
}

async fn connect(cli: &Cli, config: &ChatConfig) -> Result<Arc<dyn StoreClient>> {
    if cli.local {
        info!("Using in-process store");
        return Ok(Arc::new(MemoryStore::new().connect()));
    }

    let client = TcpStoreClient::connect(&config.store)
        .await
        .with_context(|| format!("failed to connect to DiceDB at {}", config.store.addr()))?;
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_ref());

    let config = resolve_config(&cli)?;
    let client = connect(&cli, &config).await?;

    let (sink, lines) = ChannelSink::new();
    let session = ChatSession::start(&config, client, Arc::new(sink))
        .await
        .context("failed to join the chat room")?;

    let terminal = Terminal::new();
    let cause = terminal.run(&session, lines).await;
    info!("Leaving chat room ({:?})", cause);
    if cause == ExitCause::Interrupted {
        println!();
    }

    let report = session.shutdown().await;
    match &report.delivery {
        JoinResult::Finished(outcome) => {
            info!("Delivered {} messages ({:?})", outcome.delivered, outcome.reason)
        }
        JoinResult::Cancelled => warn!("Delivery loop was cancelled during shutdown"),
        JoinResult::Failed(e) => error!("Delivery loop failed: {}", e),
    }

    terminal.release();
    Ok(())
}
