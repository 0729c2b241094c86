use opencv::{core::Mat, prelude::*};

use crate::geometry::Intrinsics;

/// Latest color image, depth image and intrinsics received from the camera.
///
/// Each slot is overwritten independently as messages arrive; the pipeline
/// only runs once both images are present.
#[derive(Default)]
pub struct FrameBuffer {
    color: Option<Mat>,
    depth: Option<Mat>,
    intrinsics: Option<Intrinsics>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_color(&mut self, color: Mat) {
        self.color = (!color.empty()).then_some(color);
    }

    pub fn set_depth(&mut self, depth: Mat) {
        self.depth = (!depth.empty()).then_some(depth);
    }

    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) {
        self.intrinsics = Some(intrinsics);
    }

    /// Color and depth together, or None until both have arrived.
    pub fn images(&self) -> Option<(&Mat, &Mat)> {
        self.color.as_ref().zip(self.depth.as_ref())
    }

    pub fn intrinsics(&self) -> Option<&Intrinsics> {
        self.intrinsics.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_16UC1, CV_8UC3};

    #[test]
    fn test_ready_needs_both_images() {
        let mut buf = FrameBuffer::new();
        assert!(buf.images().is_none());

        buf.set_color(Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(0.0)).unwrap());
        assert!(buf.images().is_none());

        buf.set_depth(Mat::new_rows_cols_with_default(4, 4, CV_16UC1, Scalar::all(0.0)).unwrap());
        assert!(buf.images().is_some());
        assert!(buf.intrinsics().is_none());
    }

    #[test]
    fn test_empty_image_clears_slot() {
        let mut buf = FrameBuffer::new();
        buf.set_color(Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(0.0)).unwrap());
        buf.set_depth(Mat::new_rows_cols_with_default(4, 4, CV_16UC1, Scalar::all(0.0)).unwrap());
        buf.set_depth(Mat::default());
        assert!(buf.images().is_none());
    }

    #[test]
    fn test_latest_intrinsics_win() {
        let mut buf = FrameBuffer::new();
        buf.set_intrinsics(Intrinsics::new(600.0, 600.0, 320.0, 240.0).unwrap());
        buf.set_intrinsics(Intrinsics::new(910.0, 910.0, 640.0, 360.0).unwrap());
        assert_eq!(buf.intrinsics().unwrap().fx(), 910.0);
    }
}
