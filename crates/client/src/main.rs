//! Bubble - headless sync client.
//!
//! Connects to the chat server, optionally activates a room, and logs
//! everything the sync core sees until interrupted.
//!
//! # Usage
//!
//! ```bash
//! bubble --room 42 --token "$BUBBLE_TOKEN"
//! bubble --room 42 --send "hello"
//! ```

#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;

/// Headless bubble sync client
#[cfg(not(target_arch = "wasm32"))]
#[derive(Parser, Debug)]
#[command(name = "bubble")]
#[command(about = "Headless realtime sync client for bubble chat")]
#[command(version)]
struct Args {
    /// Room to activate once connected
    #[arg(long)]
    room: Option<String>,

    /// Message to send to the room after it loads
    #[arg(long, requires = "room")]
    send: Option<String>,

    /// Session token to store before connecting
    #[arg(long)]
    token: Option<String>,
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use bubble_client::{ApiClient, SyncClient, SyncConfig, TokenStore};
    use bubble_shared::RoomId;
    use tracing_subscriber::EnvFilter;

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bubble_client=debug")),
        )
        .init();

    let Args { room, send, token } = args;
    let room = room.map(RoomId::from);

    let config = SyncConfig::from_env();
    let client = SyncClient::for_platform(config.clone());
    if let Some(token) = &token {
        client.tokens().set_token(token);
    }

    let driver = client.run();
    let session = async {
        // Give the connection a moment to open before the first command.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        if let Some(room) = room {
            let api = ApiClient::for_endpoint(&config.endpoint).with_token(client.tokens().token());
            if let Err(e) = client.load_room(&api, room).await {
                tracing::error!("failed to load room: {}", e.user_message());
            }
            if let Some(text) = &send {
                if let Err(e) = client.send_message(text) {
                    tracing::error!("send failed: {}", e.user_message());
                }
            }
        }
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
        client.shutdown();
    };
    tokio::join!(driver, session);
}

#[cfg(target_arch = "wasm32")]
fn main() {}
