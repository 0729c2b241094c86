use nalgebra::{Matrix3, Vector3};
use opencv::{
    core::{Mat, CV_16UC1, CV_32FC1},
    prelude::*,
};

use crate::detection::PixelCoord;
use crate::error::{PipelineError, PipelineResult};

/// Pinhole intrinsics (camera matrix K).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    k: Matrix3<f64>,
}

impl Intrinsics {
    /// From a row-major 3x3 matrix as carried by camera info messages.
    /// None when a focal length is zero or not finite.
    pub fn from_row_major(k: &[f64; 9]) -> Option<Self> {
        let k = Matrix3::from_row_slice(k);
        let intrinsics = Self { k };
        let usable = |f: f64| f.is_finite() && f != 0.0;
        (usable(intrinsics.fx()) && usable(intrinsics.fy())).then_some(intrinsics)
    }

    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Option<Self> {
        Self::from_row_major(&[fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0])
    }

    pub fn fx(&self) -> f64 {
        self.k[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.k[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.k[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.k[(1, 2)]
    }
}

/// Raw depth at a pixel; None when outside the image, zero, negative or NaN.
pub fn depth_at(depth: &Mat, pixel: PixelCoord) -> PipelineResult<Option<f64>> {
    if pixel.x < 0 || pixel.y < 0 || pixel.x >= depth.cols() || pixel.y >= depth.rows() {
        return Ok(None);
    }
    let value = match depth.typ() {
        CV_16UC1 => *depth.at_2d::<u16>(pixel.y, pixel.x)? as f64,
        CV_32FC1 => *depth.at_2d::<f32>(pixel.y, pixel.x)? as f64,
        other => return Err(PipelineError::UnsupportedDepthType(other)),
    };
    Ok((value.is_finite() && value > 0.0).then_some(value))
}

/// Pixel + depth -> 3D point in camera-optical axes (x right, y down, z forward).
///
/// Output is in metres: raw depth is multiplied by `depth_scale`.
#[derive(Debug, Clone, Copy)]
pub struct Deprojector {
    depth_scale: f64,
}

impl Deprojector {
    pub fn new(depth_scale: f64) -> Self {
        Self { depth_scale }
    }

    pub fn deproject(
        &self,
        pixel: PixelCoord,
        depth: &Mat,
        intrinsics: &Intrinsics,
    ) -> PipelineResult<Option<Vector3<f64>>> {
        let Some(raw) = depth_at(depth, pixel)? else {
            return Ok(None);
        };
        Ok(Some(deproject_pixel(pixel, raw * self.depth_scale, intrinsics)))
    }
}

pub fn deproject_pixel(pixel: PixelCoord, z: f64, intrinsics: &Intrinsics) -> Vector3<f64> {
    let x = (pixel.x as f64 - intrinsics.cx()) * z / intrinsics.fx();
    let y = (pixel.y as f64 - intrinsics.cy()) * z / intrinsics.fy();
    Vector3::new(x, y, z)
}

/// Camera-optical axes -> published frame axes: (Z, -X, -Y).
pub fn optical_to_frame(p: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(p.z, -p.x, -p.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Scalar;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn depth_with(rows: i32, cols: i32, at: PixelCoord, value: u16) -> Mat {
        let mut depth =
            Mat::new_rows_cols_with_default(rows, cols, CV_16UC1, Scalar::all(0.0)).unwrap();
        *depth.at_2d_mut::<u16>(at.y, at.x).unwrap() = value;
        depth
    }

    #[test]
    fn test_intrinsics_from_row_major() {
        let row_major = [600.0, 0.0, 320.0, 0.0, 610.0, 240.0, 0.0, 0.0, 1.0];
        let k = Intrinsics::from_row_major(&row_major).unwrap();
        assert_eq!(k.fx(), 600.0);
        assert_eq!(k.fy(), 610.0);
        assert_eq!(k.cx(), 320.0);
        assert_eq!(k.cy(), 240.0);
    }

    #[test]
    fn test_intrinsics_rejects_zero_focal() {
        assert!(Intrinsics::from_row_major(&[0.0; 9]).is_none());
        assert!(Intrinsics::new(600.0, 0.0, 320.0, 240.0).is_none());
    }

    #[test]
    fn test_deproject_principal_point() {
        let k = Intrinsics::new(600.0, 600.0, 320.0, 240.0).unwrap();
        let pixel = PixelCoord::new(320, 240);
        let depth = depth_with(480, 640, pixel, 2000);

        let p = Deprojector::new(0.001).deproject(pixel, &depth, &k).unwrap().unwrap();
        assert!(approx_eq(p.z, 2.0, 1e-12));
        assert!(approx_eq(p.x, 0.0, 1e-12));
        assert!(approx_eq(p.y, 0.0, 1e-12));
    }

    #[test]
    fn test_deproject_pinhole_formula() {
        let (fx, fy, cx, cy) = (615.2, 598.7, 318.4, 243.9);
        let k = Intrinsics::new(fx, fy, cx, cy).unwrap();
        let pixel = PixelCoord::new(500, 100);
        let d = 873.0;
        let depth = depth_with(480, 640, pixel, d as u16);

        let p = Deprojector::new(1.0).deproject(pixel, &depth, &k).unwrap().unwrap();
        assert!(approx_eq(p.z, d, 1e-9));
        assert!(approx_eq(p.x, (500.0 - cx) * d / fx, 1e-9));
        assert!(approx_eq(p.y, (100.0 - cy) * d / fy, 1e-9));
    }

    #[test]
    fn test_deproject_zero_depth_invalid() {
        let k = Intrinsics::new(600.0, 600.0, 320.0, 240.0).unwrap();
        let depth = Mat::new_rows_cols_with_default(480, 640, CV_16UC1, Scalar::all(0.0)).unwrap();
        let p = Deprojector::new(0.001).deproject(PixelCoord::new(320, 240), &depth, &k).unwrap();
        assert!(p.is_none());
    }

    #[test]
    fn test_deproject_out_of_bounds_invalid() {
        let k = Intrinsics::new(600.0, 600.0, 320.0, 240.0).unwrap();
        let depth = Mat::new_rows_cols_with_default(10, 10, CV_16UC1, Scalar::all(500.0)).unwrap();
        let d = Deprojector::new(0.001);
        assert!(d.deproject(PixelCoord::new(10, 5), &depth, &k).unwrap().is_none());
        assert!(d.deproject(PixelCoord::new(-1, 5), &depth, &k).unwrap().is_none());
    }

    #[test]
    fn test_depth_at_float_nan() {
        let mut depth = Mat::new_rows_cols_with_default(1, 2, CV_32FC1, Scalar::all(0.0)).unwrap();
        *depth.at_2d_mut::<f32>(0, 0).unwrap() = f32::NAN;
        *depth.at_2d_mut::<f32>(0, 1).unwrap() = 1.5;
        assert_eq!(depth_at(&depth, PixelCoord::new(0, 0)).unwrap(), None);
        assert_eq!(depth_at(&depth, PixelCoord::new(1, 0)).unwrap(), Some(1.5));
    }

    #[test]
    fn test_optical_to_frame() {
        let p = optical_to_frame(&Vector3::new(0.1, -0.2, 1.5));
        assert_eq!(p, Vector3::new(1.5, -0.1, 0.2));
    }
}
