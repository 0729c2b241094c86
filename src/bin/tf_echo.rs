//! Prints every frame the tracker broadcasts.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use mole_tracker::config::Config;
use mole_tracker::tf::decode_transform;
use std::net::UdpSocket;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path);
    let addr = &config.broadcast.tf_addr;

    let socket = UdpSocket::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
    eprintln!("listening on udp://{}", addr);

    let mut buf = [0u8; 1536];
    loop {
        let (n, _) = socket.recv_from(&mut buf)?;
        let tf = match decode_transform(&buf[..n]) {
            Ok(tf) => tf,
            Err(e) => {
                warn!("{e:#}");
                continue;
            }
        };
        let time = Local
            .timestamp_micros(tf.stamp_us)
            .single()
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| tf.stamp_us.to_string());
        let t = &tf.translation;
        println!(
            "{} {} -> {:<12} x={:+.3} y={:+.3} z={:+.3}",
            time, tf.base_frame, tf.child_frame, t.x, t.y, t.z
        );
    }
}
