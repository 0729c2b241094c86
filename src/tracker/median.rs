use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::detection::PixelCoord;

/// Fixed-length window of raw centroids, smoothed by a per-axis median.
///
/// The window always holds exactly `capacity` samples. It starts filled with
/// (0, 0), so the median reads (0, 0) until real detections take over; use
/// `is_converged` before trusting it.
#[derive(Debug, Clone)]
pub struct CentroidHistory {
    samples: VecDeque<PixelCoord>,
    /// Slots currently holding a real detection (saturates at capacity)
    detections: usize,
}

impl CentroidHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: std::iter::repeat(PixelCoord::default()).take(capacity).collect(),
            detections: 0,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.history_len)
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Drops the oldest sample and appends `centroid`.
    pub fn push(&mut self, centroid: PixelCoord) {
        self.samples.pop_front();
        self.samples.push_back(centroid);
        self.detections = (self.detections + 1).min(self.capacity());
    }

    /// Per-axis median of the current window.
    ///
    /// Even-length windows average the two middle samples (truncating).
    pub fn median(&self) -> PixelCoord {
        let mut xs: Vec<i32> = self.samples.iter().map(|p| p.x).collect();
        let mut ys: Vec<i32> = self.samples.iter().map(|p| p.y).collect();
        PixelCoord::new(median_i32(&mut xs), median_i32(&mut ys))
    }

    /// True once real detections fill more than half of the window, so the
    /// median no longer comes from the zero seed.
    pub fn is_converged(&self) -> bool {
        self.detections * 2 > self.capacity()
    }

    pub fn samples(&self) -> impl Iterator<Item = &PixelCoord> {
        self.samples.iter()
    }
}

fn median_i32(values: &mut [i32]) -> i32 {
    values.sort_unstable();
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        ((values[n / 2 - 1] as i64 + values[n / 2] as i64) / 2) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> PixelCoord {
        PixelCoord::new(x, y)
    }

    #[test]
    fn test_initial_median_is_zero() {
        let h = CentroidHistory::new(30);
        assert_eq!(h.capacity(), 30);
        assert_eq!(h.median(), p(0, 0));
        assert!(!h.is_converged());
    }

    #[test]
    fn test_length_stays_fixed() {
        let mut h = CentroidHistory::new(5);
        for i in 0..12 {
            h.push(p(i, i));
            assert_eq!(h.capacity(), 5);
            assert_eq!(h.samples().count(), 5);
        }
        let kept: Vec<_> = h.samples().copied().collect();
        assert_eq!(kept, vec![p(7, 7), p(8, 8), p(9, 9), p(10, 10), p(11, 11)]);
    }

    #[test]
    fn test_median_rejects_outlier() {
        let mut h = CentroidHistory::new(5);
        for sample in [p(100, 50), p(101, 51), p(400, 9), p(99, 49), p(100, 50)] {
            h.push(sample);
        }
        assert_eq!(h.median(), p(100, 50));
    }

    #[test]
    fn test_median_axes_are_independent() {
        let mut h = CentroidHistory::new(3);
        h.push(p(1, 30));
        h.push(p(2, 10));
        h.push(p(3, 20));
        assert_eq!(h.median(), p(2, 20));
    }

    #[test]
    fn test_even_length_median_averages_middle() {
        let mut h = CentroidHistory::new(4);
        for sample in [p(10, 1), p(20, 2), p(30, 3), p(40, 4)] {
            h.push(sample);
        }
        assert_eq!(h.median(), p(25, 2));
    }

    #[test]
    fn test_median_within_history_bounds() {
        let mut h = CentroidHistory::new(7);
        let mut seed: u32 = 12345;
        for _ in 0..50 {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let x = (seed >> 16) as i32 % 640;
            let y = (seed >> 8) as i32 % 480;
            h.push(p(x, y));

            let m = h.median();
            let min_x = h.samples().map(|s| s.x).min().unwrap();
            let max_x = h.samples().map(|s| s.x).max().unwrap();
            let min_y = h.samples().map(|s| s.y).min().unwrap();
            let max_y = h.samples().map(|s| s.y).max().unwrap();
            assert!(min_x <= m.x && m.x <= max_x);
            assert!(min_y <= m.y && m.y <= max_y);
        }
    }

    #[test]
    fn test_filled_history_median_is_exact() {
        let mut h = CentroidHistory::new(10);
        for _ in 0..10 {
            h.push(p(100, 100));
        }
        assert_eq!(h.median(), p(100, 100));
        assert!(h.is_converged());
    }

    #[test]
    fn test_convergence_needs_majority() {
        let mut h = CentroidHistory::new(4);
        h.push(p(5, 5));
        h.push(p(5, 5));
        assert!(!h.is_converged());
        h.push(p(5, 5));
        assert!(h.is_converged());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let h = CentroidHistory::new(0);
        assert_eq!(h.capacity(), 1);
    }
}
