//! RGB-D sender: captures registered color + depth from an OpenNI2 device and
//! streams them, with the configured intrinsics, to the tracker node.

use std::time::Duration;

use anyhow::Result;
use mole_tracker::camera::{mat_to_frame, ThreadedRgbdCamera};
use mole_tracker::config::{Config, SenderConfig};
use mole_tracker::protocol::{self, ClientMessage, MessageStream};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

async fn run_session(
    stream: &mut MessageStream,
    camera: &ThreadedRgbdCamera,
    config: &SenderConfig,
) -> Result<()> {
    protocol::send_message(stream, &ClientMessage::CameraInfo { k: config.intrinsics }).await?;

    let mut interval = time::interval(config.period()?);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_id = 0;

    loop {
        interval.tick().await;

        let id = camera.frame_id();
        if id == last_id {
            continue;
        }
        let Some(frame) = camera.get_frame() else {
            continue;
        };
        last_id = id;

        let color = ClientMessage::ColorImage(mat_to_frame(&frame.color)?);
        let depth = ClientMessage::DepthImage(mat_to_frame(&frame.depth)?);
        protocol::send_message(stream, &color).await?;
        protocol::send_message(stream, &depth).await?;
        debug!(frame = id, "sent");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path).sender;
    info!(
        server_addr = %config.server_addr,
        device_index = config.device_index,
        rate_hz = config.rate_hz,
        "rgbd sender starting"
    );

    let camera = ThreadedRgbdCamera::start(config.device_index)?;
    let (width, height) = camera.resolution();
    info!("capturing {}x{}", width, height);

    // Connect, stream, reconnect on error
    loop {
        info!("connecting to {}...", config.server_addr);
        match tokio::net::TcpStream::connect(&config.server_addr).await {
            Ok(tcp) => {
                tcp.set_nodelay(true)?;
                info!("connected");
                let mut stream = protocol::message_stream(tcp);
                if let Err(e) = run_session(&mut stream, &camera, &config).await {
                    warn!("session error: {e:#}");
                }
            }
            Err(e) => warn!("connection failed: {e}"),
        }
        info!("reconnecting in 2s...");
        time::sleep(Duration::from_secs(2)).await;
    }
}
