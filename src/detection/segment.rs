use opencv::{
    core::{self, AlgorithmHint, Mat},
    imgproc,
    prelude::*,
};

use crate::error::PipelineResult;
use crate::palette::ColorDescriptor;

/// BGR -> HSV (OpenCV 8-bit ranges).
///
/// Done once per tick; every color thresholds the same HSV image.
pub fn to_hsv(bgr: &Mat) -> PipelineResult<Mat> {
    let mut hsv = Mat::default();
    imgproc::cvt_color(bgr, &mut hsv, imgproc::COLOR_BGR2HSV, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    Ok(hsv)
}

/// Binary mask (0/255) of pixels inside any of the descriptor's ranges.
pub fn segment(hsv: &Mat, descriptor: &ColorDescriptor) -> PipelineResult<Mat> {
    let mut mask = Mat::default();
    for range in descriptor.ranges() {
        let mut part = Mat::default();
        core::in_range(hsv, &range.lower_scalar(), &range.upper_scalar(), &mut part)?;
        if mask.empty() {
            mask = part;
        } else {
            let mut combined = Mat::default();
            core::bitwise_or_def(&mask, &part, &mut combined)?;
            mask = combined;
        }
    }
    Ok(mask)
}
