//! Conversion between wire `ImageFrame`s and OpenCV `Mat`s.

use anyhow::{bail, Context, Result};
use opencv::{
    core::{Mat, Scalar, CV_16UC1, CV_8UC3},
    prelude::*,
};

use crate::protocol::{ImageEncoding, ImageFrame};

pub fn frame_to_mat(frame: &ImageFrame) -> Result<Mat> {
    let expected = frame.expected_len().with_context(|| {
        format!("{:?} frame {}x{} is too large", frame.encoding, frame.width, frame.height)
    })?;
    if frame.data.len() != expected {
        bail!(
            "{:?} frame {}x{} carries {} bytes, expected {}",
            frame.encoding,
            frame.width,
            frame.height,
            frame.data.len(),
            expected
        );
    }
    let rows = i32::try_from(frame.height).context("frame height out of range")?;
    let cols = i32::try_from(frame.width).context("frame width out of range")?;

    match frame.encoding {
        ImageEncoding::Bgr8 => {
            let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0))?;
            mat.data_bytes_mut()?.copy_from_slice(&frame.data);
            Ok(mat)
        }
        ImageEncoding::Mono16 => {
            let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_16UC1, Scalar::all(0.0))?;
            let dst = mat.data_typed_mut::<u16>()?;
            for (d, chunk) in dst.iter_mut().zip(frame.data.chunks_exact(2)) {
                *d = u16::from_le_bytes([chunk[0], chunk[1]]);
            }
            Ok(mat)
        }
    }
}

/// Packs a BGR (`CV_8UC3`) or depth (`CV_16UC1`) image for the wire.
pub fn mat_to_frame(mat: &Mat) -> Result<ImageFrame> {
    // deep copy is always continuous
    let mat = mat.try_clone()?;
    let width = mat.cols() as u32;
    let height = mat.rows() as u32;

    let (encoding, data) = match mat.typ() {
        CV_8UC3 => (ImageEncoding::Bgr8, mat.data_bytes()?.to_vec()),
        CV_16UC1 => {
            let data = mat
                .data_typed::<u16>()?
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
            (ImageEncoding::Mono16, data)
        }
        other => bail!("cannot send image of type {}", other),
    };

    Ok(ImageFrame { width, height, encoding, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    #[test]
    fn test_bgr_frame_to_mat() {
        // 2x1: blue pixel then red pixel
        let frame = ImageFrame {
            width: 2,
            height: 1,
            encoding: ImageEncoding::Bgr8,
            data: vec![255, 0, 0, 0, 0, 255],
        };
        let mat = frame_to_mat(&frame).unwrap();
        assert_eq!(mat.typ(), CV_8UC3);
        assert_eq!(mat.at_2d::<Vec3b>(0, 0).unwrap().0, [255, 0, 0]);
        assert_eq!(mat.at_2d::<Vec3b>(0, 1).unwrap().0, [0, 0, 255]);
    }

    #[test]
    fn test_mono16_is_little_endian() {
        let frame = ImageFrame {
            width: 1,
            height: 2,
            encoding: ImageEncoding::Mono16,
            data: vec![0xf4, 0x01, 0x78, 0x05],
        };
        let mat = frame_to_mat(&frame).unwrap();
        assert_eq!(mat.typ(), CV_16UC1);
        assert_eq!(*mat.at_2d::<u16>(0, 0).unwrap(), 500);
        assert_eq!(*mat.at_2d::<u16>(1, 0).unwrap(), 1400);
    }

    #[test]
    fn test_short_payload_rejected() {
        let frame = ImageFrame {
            width: 4,
            height: 4,
            encoding: ImageEncoding::Bgr8,
            data: vec![0; 10],
        };
        assert!(frame_to_mat(&frame).is_err());
    }

    #[test]
    fn test_oversized_header_rejected() {
        let frame = ImageFrame {
            width: u32::MAX,
            height: u32::MAX,
            encoding: ImageEncoding::Mono16,
            data: vec![0; 8],
        };
        assert!(frame_to_mat(&frame).is_err());
    }

    #[test]
    fn test_depth_mat_to_frame() {
        let mut mat = Mat::new_rows_cols_with_default(1, 2, CV_16UC1, Scalar::all(0.0)).unwrap();
        *mat.at_2d_mut::<u16>(0, 1).unwrap() = 0x0102;
        let frame = mat_to_frame(&mat).unwrap();
        assert_eq!(frame.encoding, ImageEncoding::Mono16);
        assert_eq!(frame.data, vec![0, 0, 0x02, 0x01]);
    }
}
