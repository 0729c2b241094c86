//! Tracker node: per-tick pipeline state and the serialized event loop.

use anyhow::{Context, Result};
use chrono::Utc;
use nalgebra::Vector3;
use opencv::core::Mat;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::camera::{frame_to_mat, FrameBuffer};
use crate::config::{CentroidMode, Config, FallbackPolicy};
use crate::detection::{annotate, centroid_in_roi, segment, to_hsv, DepthGate, PixelCoord, Roi};
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{optical_to_frame, Deprojector, Intrinsics};
use crate::palette::{MoleColor, PALETTE};
use crate::protocol::{message_stream, recv_message, send_message, ClientMessage, ServerMessage};
use crate::tf::{FrameTransform, TransformSink};
use crate::tracker::CentroidHistory;

/// Receives the annotated, depth-gated image once per tick.
pub trait ImageSink {
    fn show(&mut self, image: &Mat) -> Result<()>;

    /// False once the viewer wants the node to stop.
    fn is_open(&self) -> bool {
        true
    }
}

/// Last valid 3D point (camera-optical axes), held per color or shared.
#[derive(Debug, Clone)]
enum Fallback {
    PerColor([Vector3<f64>; MoleColor::COUNT]),
    Shared(Vector3<f64>),
}

impl Fallback {
    fn new(policy: FallbackPolicy) -> Self {
        match policy {
            FallbackPolicy::PerColor => Fallback::PerColor([Vector3::zeros(); MoleColor::COUNT]),
            FallbackPolicy::Shared => Fallback::Shared(Vector3::zeros()),
        }
    }

    fn get(&self, color: MoleColor) -> Vector3<f64> {
        match self {
            Fallback::PerColor(points) => points[color.index()],
            Fallback::Shared(point) => *point,
        }
    }

    fn set(&mut self, color: MoleColor, p: Vector3<f64>) {
        match self {
            Fallback::PerColor(points) => points[color.index()] = p,
            Fallback::Shared(point) => *point = p,
        }
    }
}

/// What one color produced in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorEstimate {
    pub color: MoleColor,
    /// Centroid found in this tick's image
    pub raw: Option<PixelCoord>,
    /// Median of the history after this tick
    pub smoothed: PixelCoord,
    pub converged: bool,
    /// Camera-optical point that was published
    pub point: Vector3<f64>,
    /// True when `point` is the held fallback rather than a fresh deprojection
    pub held: bool,
}

pub struct TickOutput {
    /// In palette order
    pub estimates: Vec<ColorEstimate>,
    pub transforms: Vec<FrameTransform>,
    /// Annotated gated image, only when filtered output is enabled
    pub filtered: Option<Mat>,
}

/// Everything the broadcast loop mutates. Owned by a single task.
pub struct MoleTracker {
    frames: FrameBuffer,
    gate: DepthGate,
    roi: Roi,
    centroid_mode: CentroidMode,
    deprojector: Deprojector,
    base_frame: String,
    histories: [CentroidHistory; MoleColor::COUNT],
    fallback: Fallback,
    publishing: bool,
    filtered_output: bool,
}

impl MoleTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            frames: FrameBuffer::new(),
            gate: DepthGate::new(config.detection.clipping_distance),
            roi: config.detection.roi,
            centroid_mode: config.detection.centroid,
            deprojector: Deprojector::new(config.detection.depth_scale),
            base_frame: config.broadcast.base_frame.clone(),
            histories: std::array::from_fn(|_| CentroidHistory::from_config(&config.tracker)),
            fallback: Fallback::new(config.tracker.fallback),
            publishing: true,
            filtered_output: true,
        }
    }

    /// Whether `tick` draws the annotated image. Off when nothing displays it.
    pub fn set_filtered_output(&mut self, enabled: bool) {
        self.filtered_output = enabled;
    }

    pub fn ingest_color(&mut self, image: Mat) {
        self.frames.set_color(image);
    }

    pub fn ingest_depth(&mut self, image: Mat) {
        self.frames.set_depth(image);
    }

    pub fn ingest_intrinsics(&mut self, intrinsics: Intrinsics) {
        self.frames.set_intrinsics(intrinsics);
    }

    /// Flips the publish-enable flag and returns the new state.
    pub fn toggle_publish(&mut self) -> bool {
        self.publishing = !self.publishing;
        self.publishing
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing
    }

    pub fn history(&self, color: MoleColor) -> &CentroidHistory {
        &self.histories[color.index()]
    }

    pub fn fallback_point(&self, color: MoleColor) -> Vector3<f64> {
        self.fallback.get(color)
    }

    /// One detect, smooth, deproject and publish pass over every color.
    ///
    /// `Ok(None)` until both a color and a depth image have arrived.
    pub fn tick(&mut self, stamp_us: i64) -> PipelineResult<Option<TickOutput>> {
        let Some((color_image, depth_image)) = self.frames.images() else {
            return Ok(None);
        };

        let gated = self.gate.apply(color_image, depth_image)?;
        let hsv = to_hsv(&gated)?;

        let mut estimates = Vec::with_capacity(MoleColor::COUNT);
        let mut transforms = Vec::with_capacity(MoleColor::COUNT);

        for descriptor in PALETTE.iter() {
            let color = descriptor.color;
            let mask = segment(&hsv, descriptor)?;
            let raw = centroid_in_roi(&mask, &self.roi, self.centroid_mode)?;

            let history = &mut self.histories[color.index()];
            if let Some(centroid) = raw {
                if self.publishing {
                    history.push(centroid);
                }
            }
            let smoothed = history.median();
            let converged = history.is_converged();

            let fresh = match (converged, self.frames.intrinsics()) {
                (true, Some(k)) => self.deprojector.deproject(smoothed, depth_image, k)?,
                _ => None,
            };
            let point = match fresh {
                Some(p) => {
                    self.fallback.set(color, p);
                    p
                }
                None => self.fallback.get(color),
            };

            transforms.push(FrameTransform::translation_only(
                stamp_us,
                self.base_frame.as_str(),
                color.frame_id(),
                optical_to_frame(&point),
            ));
            estimates.push(ColorEstimate {
                color,
                raw,
                smoothed,
                converged,
                point,
                held: fresh.is_none(),
            });
        }

        let filtered = if self.filtered_output {
            let marks: Vec<_> = estimates.iter().map(|e| (e.color, e.smoothed)).collect();
            Some(annotate(&gated, &marks, &self.roi)?)
        } else {
            None
        };

        Ok(Some(TickOutput {
            estimates,
            transforms,
            filtered,
        }))
    }

    fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Color(image) => self.ingest_color(image),
            NodeEvent::Depth(image) => self.ingest_depth(image),
            NodeEvent::CameraInfo(k) => match Intrinsics::from_row_major(&k) {
                Some(intrinsics) => self.ingest_intrinsics(intrinsics),
                None => warn!("ignoring camera info with zero focal length: {:?}", k),
            },
            NodeEvent::Toggle(reply) => {
                let publishing = self.toggle_publish();
                info!(publishing, "publish toggled");
                let _ = reply.send(publishing);
            }
        }
    }
}

/// Work forwarded from connection tasks to the loop that owns `MoleTracker`.
pub enum NodeEvent {
    Color(Mat),
    Depth(Mat),
    CameraInfo([f64; 9]),
    Toggle(oneshot::Sender<bool>),
}

/// Ticks and detections per color, logged once per second.
struct RateStats {
    since: Instant,
    ticks: u32,
    detections: [u32; MoleColor::COUNT],
}

impl RateStats {
    fn new() -> Self {
        Self {
            since: Instant::now(),
            ticks: 0,
            detections: [0; MoleColor::COUNT],
        }
    }

    fn record(&mut self, output: &TickOutput) {
        self.ticks += 1;
        for estimate in &output.estimates {
            if estimate.raw.is_some() {
                self.detections[estimate.color.index()] += 1;
            }
        }
    }

    fn maybe_log(&mut self, publishing: bool) {
        if self.since.elapsed() < Duration::from_secs(1) {
            return;
        }
        let [green, yellow, blue, red] = self.detections;
        info!(ticks = self.ticks, green, yellow, blue, red, publishing, "rate");
        *self = Self::new();
    }
}

/// Runs the node until ctrl-c, the viewer closes, or a fatal pipeline error.
pub async fn run(
    config: &Config,
    sink: &mut dyn TransformSink,
    mut image_sink: Option<&mut dyn ImageSink>,
) -> Result<()> {
    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    info!("listening on {}", config.server.listen_addr);

    let (tx, mut rx) = mpsc::channel::<NodeEvent>(64);
    tokio::spawn(accept_loop(listener, tx));

    let mut tracker = MoleTracker::new(config);
    tracker.set_filtered_output(image_sink.is_some());
    let mut interval = time::interval(config.broadcast.period()?);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = RateStats::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match tracker.tick(Utc::now().timestamp_micros()) {
                    Ok(Some(output)) => {
                        if let Err(e) = sink.send_transforms(&output.transforms) {
                            warn!("failed to send frames: {:#}", e);
                        }
                        let viewer = image_sink.as_deref_mut();
                        if let (Some(viewer), Some(filtered)) = (viewer, &output.filtered) {
                            viewer.show(filtered)?;
                            if !viewer.is_open() {
                                info!("viewer closed");
                                return Ok(());
                            }
                        }
                        stats.record(&output);
                    }
                    Ok(None) => {}
                    Err(e @ PipelineError::DimensionMismatch { .. }) => {
                        error!("{}", e);
                        return Err(e.into());
                    }
                    Err(e) => warn!("tick skipped: {}", e),
                }
                stats.maybe_log(tracker.is_publishing());
            }
            Some(event) = rx.recv() => tracker.handle_event(event),
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<NodeEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("{} connected", peer);
                let tx = tx.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, tx).await {
                        Ok(()) => info!("{} disconnected", peer),
                        Err(e) => warn!("{} dropped: {:#}", peer, e),
                    }
                });
            }
            Err(e) => {
                warn!("accept failed: {}", e);
                time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, tx: mpsc::Sender<NodeEvent>) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut stream = message_stream(stream);

    while let Some(msg) = recv_message::<ClientMessage>(&mut stream).await? {
        let event = match msg {
            ClientMessage::ColorImage(frame) => match frame_to_mat(&frame) {
                Ok(image) => NodeEvent::Color(image),
                Err(e) => {
                    warn!("bad color image: {:#}", e);
                    continue;
                }
            },
            ClientMessage::DepthImage(frame) => match frame_to_mat(&frame) {
                Ok(image) => NodeEvent::Depth(image),
                Err(e) => {
                    warn!("bad depth image: {:#}", e);
                    continue;
                }
            },
            ClientMessage::CameraInfo { k } => NodeEvent::CameraInfo(k),
            ClientMessage::TogglePublish => {
                let (reply_tx, reply_rx) = oneshot::channel();
                tx.send(NodeEvent::Toggle(reply_tx))
                    .await
                    .map_err(|_| anyhow::anyhow!("tracker stopped"))?;
                let publishing = reply_rx.await.context("tracker stopped")?;
                send_message(&mut stream, &ServerMessage::ToggleAck { publishing }).await?;
                continue;
            }
        };
        tx.send(event).await.map_err(|_| anyhow::anyhow!("tracker stopped"))?;
    }
    Ok(())
}
