use opencv::core::Size;
use thiserror::Error;

/// Failures that stop a tick. "No detection" and "no depth" are not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "color image is {}x{} but depth image is {}x{}",
        .color.width,
        .color.height,
        .depth.width,
        .depth.height
    )]
    DimensionMismatch { color: Size, depth: Size },

    #[error("unsupported depth image type {0} (expected CV_16UC1 or CV_32FC1)")]
    UnsupportedDepthType(i32),

    #[error("unsupported color image type {0} (expected CV_8UC3)")]
    UnsupportedColorType(i32),

    #[error(transparent)]
    Cv(#[from] opencv::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
