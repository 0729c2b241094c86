use opencv::{
    core::{Mat, Point, Scalar},
    imgproc,
    prelude::*,
};

use super::centroid::PixelCoord;
use super::gate::Roi;
use crate::error::PipelineResult;
use crate::palette::MoleColor;

/// Gated image with every smoothed centroid circled and labelled and the
/// ROI outlined. For visualization only.
pub fn annotate(gated: &Mat, marks: &[(MoleColor, PixelCoord)], roi: &Roi) -> PipelineResult<Mat> {
    let mut image = gated.try_clone()?;
    let mark_color = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let label_color = Scalar::new(255.0, 255.0, 255.0, 0.0);

    for (color, centroid) in marks {
        let center = Point::new(centroid.x, centroid.y);
        imgproc::circle(&mut image, center, 5, mark_color, 10, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            &mut image,
            color.name(),
            center,
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            label_color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    imgproc::rectangle_points(
        &mut image,
        Point::new(roi.start_x, roi.start_y),
        Point::new(roi.end_x, roi.end_y),
        mark_color,
        5,
        imgproc::LINE_8,
        0,
    )?;

    Ok(image)
}
