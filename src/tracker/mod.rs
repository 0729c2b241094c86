pub mod median;

pub use median::CentroidHistory;
