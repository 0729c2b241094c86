pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod node;
pub mod palette;
pub mod protocol;
#[cfg(feature = "desktop")]
pub mod render;
pub mod tf;
pub mod tracker;
