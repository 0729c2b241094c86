pub mod bridge;
pub mod capture;
pub mod frame;

pub use bridge::{frame_to_mat, mat_to_frame};
pub use capture::{RgbdCamera, RgbdFrame, ThreadedRgbdCamera};
pub use frame::FrameBuffer;
