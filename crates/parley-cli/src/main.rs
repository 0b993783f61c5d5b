//! parley - terminal chat client

mod config;
mod render;

use clap::Parser;
use parley_sync::{ChatSession, ConnectionStatus, SessionUpdate, WebSocketConnector};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// parley - chat with a streaming assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Conversation to join
    #[arg(short, long)]
    conversation: Option<String>,

    /// Server base URL (default: ws://localhost:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Your participant id on the server
    #[arg(short, long)]
    participant: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("parley=debug,parley_sync=debug,parley_proto=debug")
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let Some(conversation) = args.conversation else {
        anyhow::bail!("--conversation is required");
    };

    let config = config::Config::load();
    let session_config = config.session_config(args.server, args.participant);
    tracing::debug!("Using server {}", session_config.server_url);

    let mut session =
        ChatSession::connect(session_config, Arc::new(WebSocketConnector), conversation)?;

    let result = run_interactive(&mut session, args.verbose).await;
    session.close().await;
    result
}

async fn run_interactive(session: &mut ChatSession, verbose: bool) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("parley conversation: {}", session.conversation_id());
        eprintln!("Type a message and press Enter. Ctrl-D to quit.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = render::Renderer::new(verbose);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // EOF
                    break;
                };
                if matches!(line.trim(), "/quit" | "/exit") {
                    break;
                }
                if let Some(temp_id) = session.submit_user_message(&line) {
                    if !session.is_connected() {
                        eprintln!("[not connected; message {} kept locally]", temp_id);
                    }
                }
            }

            update = session.next_update() => {
                let Some(update) = update else {
                    break;
                };
                renderer.render(session, update)?;
                if update == SessionUpdate::Status(ConnectionStatus::Disconnected) {
                    break;
                }
            }
        }
    }

    Ok(())
}
