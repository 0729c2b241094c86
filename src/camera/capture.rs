use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{info, warn};

/// Registered color + depth pair from one device grab.
#[derive(Clone)]
pub struct RgbdFrame {
    /// BGR, CV_8UC3
    pub color: Mat,
    /// Millimetres, CV_16UC1
    pub depth: Mat,
}

/// OpenNI2 RGB-D camera (Kinect, Xtion, Orbbec...) through OpenCV.
pub struct RgbdCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl RgbdCamera {
    pub fn open(index: i32) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, videoio::CAP_OPENNI2).context("Failed to open RGB-D device")?;

        if !capture.is_opened()? {
            anyhow::bail!("RGB-D device {} is not available", index);
        }

        // depth pixels aligned to the color image
        capture.set(videoio::CAP_PROP_OPENNI_REGISTRATION, 1.0)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        info!(index, width, height, fps, "RGB-D device opened");

        Ok(Self { capture, width, height })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Grabs one synchronized color + depth pair.
    pub fn read_frame(&mut self) -> Result<RgbdFrame> {
        if !self.capture.grab()? {
            anyhow::bail!("Failed to grab frame");
        }

        let mut color = Mat::default();
        let mut depth = Mat::default();
        self.capture
            .retrieve(&mut color, videoio::CAP_OPENNI_BGR_IMAGE)
            .context("Failed to retrieve color image")?;
        self.capture
            .retrieve(&mut depth, videoio::CAP_OPENNI_DEPTH_MAP)
            .context("Failed to retrieve depth map")?;

        if color.empty() || depth.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(RgbdFrame { color, depth })
    }
}

/// Captures on a dedicated thread and keeps only the latest pair.
pub struct ThreadedRgbdCamera {
    latest: Arc<Mutex<Option<RgbdFrame>>>,
    frame_id: Arc<AtomicU64>,
    width: u32,
    height: u32,
    _handle: thread::JoinHandle<()>,
}

impl ThreadedRgbdCamera {
    pub fn start(index: i32) -> Result<Self> {
        let mut camera = RgbdCamera::open(index)?;
        let (width, height) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<RgbdFrame>));
        let latest_ref = latest.clone();
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = frame_id.clone();

        let handle = thread::spawn(move || loop {
            match camera.read_frame() {
                Ok(frame) => {
                    if let Ok(mut slot) = latest_ref.lock() {
                        *slot = Some(frame);
                    }
                    frame_id_ref.fetch_add(1, Ordering::Release);
                }
                Err(e) => {
                    warn!("capture failed: {:#}", e);
                    thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        });

        Ok(Self {
            latest,
            frame_id,
            width,
            height,
            _handle: handle,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Incremented for every new pair.
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// Latest pair; None until the first grab succeeds.
    pub fn get_frame(&self) -> Option<RgbdFrame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}
