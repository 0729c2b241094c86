//! TCP protocol between the camera sender / control tools and the tracker node.
//!
//! Self-contained: no imports from other mole_tracker modules.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

// --- Image payload ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// 3 bytes per pixel, blue-green-red
    Bgr8,
    /// 2 bytes per pixel, little-endian u16 depth in millimetres
    Mono16,
}

impl ImageEncoding {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageEncoding::Bgr8 => 3,
            ImageEncoding::Mono16 => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    /// Row-major, tightly packed
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// Payload size implied by the header; None when it overflows `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.encoding.bytes_per_pixel())
    }
}

// --- Message types ---

/// Sender/tool → tracker
#[derive(Serialize, Deserialize, Debug)]
pub enum ClientMessage {
    ColorImage(ImageFrame),
    DepthImage(ImageFrame),
    /// Intrinsic matrix K (row-major 3x3)
    CameraInfo { k: [f64; 9] },
    TogglePublish,
}

/// Tracker → sender/tool
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub enum ServerMessage {
    ToggleAck { publishing: bool },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024) // 16MB, a 1280x720 BGR frame is ~2.7MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` on a clean close.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
