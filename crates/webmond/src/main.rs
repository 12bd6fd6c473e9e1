//! webmon daemon - RESP control socket over the recent-activity monitor

mod handler;
mod persist;
mod resp;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use webmoncache::{MonitorConfig, WebMonitor, DEFAULT_QUEUE_CAPACITY};

use crate::handler::CommandHandler;
use crate::persist::SnapshotStore;
use crate::resp::RespValue;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    bind: String,

    /// Snapshot directory
    #[arg(short, long, default_value = "./data")]
    data: String,

    /// Recent domains kept
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY as i64)]
    max_domains: i64,

    /// Recent search terms kept
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY as i64)]
    max_searches: i64,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting webmond v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::new(args.max_domains, args.max_searches)
        .context("Invalid queue capacity")?;
    info!(
        max_domains = config.max_domains.get(),
        max_searches = config.max_searches.get(),
        data = %args.data,
        "Monitor configured"
    );

    let monitor = Arc::new(WebMonitor::new(config));
    let store = Arc::new(SnapshotStore::new(&args.data));
    store.load(&monitor)?;

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Listening on {}", args.bind);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let handler = CommandHandler::new(Arc::clone(&monitor), Arc::clone(&store));

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            error!("Error handling client {}: {}", addr, e);
                        }
                        info!("Connection closed: {}", addr);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    store.save(&monitor)?;
    Ok(())
}

async fn handle_client(mut stream: TcpStream, handler: CommandHandler) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        loop {
            match RespValue::parse(&mut buffer) {
                Ok(Some(cmd)) => {
                    let response = handler.handle(cmd);
                    stream.write_all(&response.serialize()).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Parse error: {}", e);
                    stream.write_all(&RespValue::err(e).serialize()).await?;
                    buffer.clear();
                    break;
                }
            }
        }
    }
}
