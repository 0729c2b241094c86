pub mod annotate;
pub mod centroid;
pub mod gate;
pub mod segment;

pub use annotate::annotate;
pub use centroid::{centroid_in_roi, PixelCoord};
pub use gate::{DepthGate, Roi};
pub use segment::{segment, to_hsv};
