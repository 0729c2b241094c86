//! Flips the tracker's publish-enable flag and prints the new state.

use anyhow::{bail, Context, Result};
use mole_tracker::config::Config;
use mole_tracker::protocol::{self, ClientMessage, ServerMessage};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path);
    let addr = &config.server.listen_addr;

    let tcp = tokio::net::TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    info!("connected to {}", addr);
    let mut stream = protocol::message_stream(tcp);

    protocol::send_message(&mut stream, &ClientMessage::TogglePublish).await?;
    match protocol::recv_message::<ServerMessage>(&mut stream).await? {
        Some(ServerMessage::ToggleAck { publishing }) => {
            println!("publishing: {}", publishing);
            Ok(())
        }
        None => bail!("tracker closed the connection without answering"),
    }
}
