use opencv::{
    core::{Mat, Point, Vector},
    imgproc,
    prelude::*,
};

use super::gate::Roi;
use crate::config::CentroidMode;
use crate::error::PipelineResult;

/// Integer pixel coordinate (column, row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelCoord {
    pub x: i32,
    pub y: i32,
}

impl PixelCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Centroid of the "on" pixels of `mask` inside `roi`, in full-image
/// coordinates. None when the ROI holds no matching pixel.
pub fn centroid_in_roi(
    mask: &Mat,
    roi: &Roi,
    mode: CentroidMode,
) -> PipelineResult<Option<PixelCoord>> {
    let Some(rect) = roi.clamp_to(mask.size()?) else {
        return Ok(None);
    };
    let cropped = Mat::roi(mask, rect)?.try_clone()?;

    let local = match mode {
        CentroidMode::Mean => mean_centroid(&cropped)?,
        CentroidMode::LargestContour => largest_contour_centroid(&cropped)?,
    };

    Ok(local.map(|(x, y)| PixelCoord::new(rect.x + x.round() as i32, rect.y + y.round() as i32)))
}

/// Mean coordinate of all non-zero pixels.
fn mean_centroid(mask: &Mat) -> PipelineResult<Option<(f64, f64)>> {
    let m = imgproc::moments(mask, true)?;
    if m.m00 == 0.0 {
        return Ok(None);
    }
    Ok(Some((m.m10 / m.m00, m.m01 / m.m00)))
}

/// Centroid of the contour with the largest area; zero area counts as nothing.
fn largest_contour_centroid(mask: &Mat) -> PipelineResult<Option<(f64, f64)>> {
    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours_def(
        mask,
        &mut contours,
        imgproc::RETR_LIST,
        imgproc::CHAIN_APPROX_SIMPLE,
    )?;

    let mut largest: Option<(f64, Vector<Point>)> = None;
    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        if largest.as_ref().map_or(true, |(best, _)| area > *best) {
            largest = Some((area, contour));
        }
    }

    let Some((area, contour)) = largest else {
        return Ok(None);
    };
    if area == 0.0 {
        return Ok(None);
    }

    let m = imgproc::moments(&contour, false)?;
    if m.m00 == 0.0 {
        return Ok(None);
    }
    Ok(Some((m.m10 / m.m00, m.m01 / m.m00)))
}
