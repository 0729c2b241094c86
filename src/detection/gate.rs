use opencv::{
    core::{self, Mat, Rect, Scalar, Size, CMP_GT, CMP_LE, CV_16UC1, CV_32FC1, CV_8UC3},
    prelude::*,
};
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};

/// Pixel rectangle `[start, end)` on each axis, as configured.
///
/// start <= end is the caller's responsibility; an inverted rectangle simply
/// contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
}

impl Roi {
    pub fn new(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Self {
        Self { start_x, start_y, end_x, end_y }
    }

    /// Rectangle clipped to the image bounds, or None when nothing remains.
    pub fn clamp_to(&self, size: Size) -> Option<Rect> {
        let x0 = self.start_x.clamp(0, size.width);
        let y0 = self.start_y.clamp(0, size.height);
        let x1 = self.end_x.clamp(0, size.width);
        let y1 = self.end_y.clamp(0, size.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Zeroes color pixels whose depth is missing or beyond the clipping distance.
#[derive(Debug, Clone, Copy)]
pub struct DepthGate {
    clipping_distance: f64,
}

impl DepthGate {
    pub fn new(clipping_distance: f64) -> Self {
        Self { clipping_distance }
    }

    /// 255 where `0 < depth <= clipping_distance`, 0 elsewhere.
    pub fn valid_mask(&self, depth: &Mat) -> PipelineResult<Mat> {
        check_depth_type(depth)?;

        let mut positive = Mat::default();
        core::compare(depth, &Scalar::all(0.0), &mut positive, CMP_GT)?;
        let mut near = Mat::default();
        core::compare(depth, &Scalar::all(self.clipping_distance), &mut near, CMP_LE)?;

        let mut valid = Mat::default();
        core::bitwise_and_def(&positive, &near, &mut valid)?;
        Ok(valid)
    }

    /// Copy of `color` with out-of-range pixels set to black.
    pub fn apply(&self, color: &Mat, depth: &Mat) -> PipelineResult<Mat> {
        if color.typ() != CV_8UC3 {
            return Err(PipelineError::UnsupportedColorType(color.typ()));
        }
        let color_size = color.size()?;
        let depth_size = depth.size()?;
        if color_size != depth_size {
            return Err(PipelineError::DimensionMismatch {
                color: color_size,
                depth: depth_size,
            });
        }

        let valid = self.valid_mask(depth)?;
        let (rows, cols, typ) = (color.rows(), color.cols(), color.typ());
        let mut gated = Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(0.0))?;
        color.copy_to_masked(&mut gated, &valid)?;
        Ok(gated)
    }
}

pub(crate) fn check_depth_type(depth: &Mat) -> PipelineResult<()> {
    match depth.typ() {
        CV_16UC1 | CV_32FC1 => Ok(()),
        other => Err(PipelineError::UnsupportedDepthType(other)),
    }
}
