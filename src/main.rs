use anyhow::Result;
use mole_tracker::config::Config;
use mole_tracker::node::{self, ImageSink};
use mole_tracker::tf::TfClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path);

    info!(
        clipping_distance = config.detection.clipping_distance,
        roi = ?config.detection.roi,
        centroid = ?config.detection.centroid,
        history_len = config.tracker.history_len,
        fallback = ?config.tracker.fallback,
        rate_hz = config.broadcast.rate_hz,
        base_frame = %config.broadcast.base_frame,
        "mole tracker starting"
    );
    info!("frames -> udp://{}", config.broadcast.tf_addr);

    let mut sink = TfClient::new(&config.broadcast.tf_addr)?;

    #[cfg(feature = "desktop")]
    let mut view = config
        .debug
        .view
        .then(|| mole_tracker::render::DebugView::new("Mole Tracker - filtered"));
    #[cfg(not(feature = "desktop"))]
    let mut view: Option<NoView> = None;

    let image_sink = view.as_mut().map(|v| v as &mut dyn ImageSink);
    node::run(&config, &mut sink, image_sink).await
}

#[cfg(not(feature = "desktop"))]
struct NoView;

#[cfg(not(feature = "desktop"))]
impl ImageSink for NoView {
    fn show(&mut self, _image: &opencv::core::Mat) -> Result<()> {
        Ok(())
    }
}
