pub mod window;

pub use window::{DebugView, MinifbRenderer};
