use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

/// OSC address every frame is sent to
pub const TF_ADDRESS: &str = "/tf";

/// Timestamped rigid transform from `base_frame` to `child_frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    /// Microseconds since the Unix epoch
    pub stamp_us: i64,
    pub base_frame: String,
    pub child_frame: String,
    /// Metres
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl FrameTransform {
    /// Pure translation (identity rotation).
    pub fn translation_only(
        stamp_us: i64,
        base_frame: impl Into<String>,
        child_frame: impl Into<String>,
        translation: Vector3<f64>,
    ) -> Self {
        Self {
            stamp_us,
            base_frame: base_frame.into(),
            child_frame: child_frame.into(),
            translation,
            rotation: UnitQuaternion::identity(),
        }
    }
}

/// Args: base, child, stamp_us, x, y, z, qx, qy, qz, qw
pub fn build_osc_message(tf: &FrameTransform) -> OscMessage {
    let q = tf.rotation.quaternion();
    OscMessage {
        addr: TF_ADDRESS.to_string(),
        args: vec![
            OscType::String(tf.base_frame.clone()),
            OscType::String(tf.child_frame.clone()),
            OscType::Long(tf.stamp_us),
            OscType::Double(tf.translation.x),
            OscType::Double(tf.translation.y),
            OscType::Double(tf.translation.z),
            OscType::Double(q.i),
            OscType::Double(q.j),
            OscType::Double(q.k),
            OscType::Double(q.w),
        ],
    }
}

pub fn encode_osc_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// Inverse of `build_osc_message` + `encode_osc_message`.
pub fn decode_transform(packet: &[u8]) -> Result<FrameTransform> {
    let (_, packet) =
        decoder::decode_udp(packet).map_err(|e| anyhow!("bad OSC packet: {:?}", e))?;
    let OscPacket::Message(msg) = packet else {
        bail!("expected an OSC message, got a bundle");
    };
    if msg.addr != TF_ADDRESS {
        bail!("unexpected OSC address {}", msg.addr);
    }

    let [OscType::String(base), OscType::String(child), OscType::Long(stamp_us), pose @ ..] =
        msg.args.as_slice()
    else {
        bail!("malformed /tf header");
    };
    let pose = pose
        .iter()
        .map(|arg| match arg {
            OscType::Double(v) => Ok(*v),
            other => Err(anyhow!("non-double /tf pose value {:?}", other)),
        })
        .collect::<Result<Vec<f64>>>()?;
    let &[x, y, z, qx, qy, qz, qw] = pose.as_slice() else {
        bail!("expected 7 /tf pose values, got {}", pose.len());
    };

    Ok(FrameTransform {
        stamp_us: *stamp_us,
        base_frame: base.clone(),
        child_frame: child.clone(),
        translation: Vector3::new(x, y, z),
        rotation: UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz)),
    })
}

/// Where the broadcast loop sends its frames.
pub trait TransformSink {
    fn send_transforms(&mut self, transforms: &[FrameTransform]) -> Result<()>;
}

/// Collects frames in memory.
impl TransformSink for Vec<FrameTransform> {
    fn send_transforms(&mut self, transforms: &[FrameTransform]) -> Result<()> {
        self.extend_from_slice(transforms);
        Ok(())
    }
}

/// Sends every frame as one OSC datagram.
pub struct TfClient {
    socket: UdpSocket,
    target_addr: String,
}

impl TfClient {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn send(&self, tf: &FrameTransform) -> Result<()> {
        let msg = build_osc_message(tf);
        let data = encode_osc_message(&msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

impl TransformSink for TfClient {
    fn send_transforms(&mut self, transforms: &[FrameTransform]) -> Result<()> {
        for tf in transforms {
            self.send(tf)?;
        }
        Ok(())
    }
}
