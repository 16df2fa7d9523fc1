//! # Telemetry Window
//!
//! Trailing buffer of derived values for live display.
//!
//! Points older than the window duration (relative to the newest insert) are
//! evicted on every insert, and the buffer never holds more than `max_points`
//! entries. Inserts are expected in non-decreasing timestamp order from a single
//! producer.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Default trailing duration of the window
pub const DEFAULT_WINDOW_DURATION: Duration = Duration::from_secs(10);

/// Default maximum number of retained points
pub const DEFAULT_MAX_POINTS: usize = 100;

/// One value in the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPoint {
    /// Derived value
    pub value: f64,
    /// When the value was observed
    pub observed_at: Instant,
}

/// Time- and count-bounded window of values
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    points: VecDeque<WindowPoint>,
    duration: Duration,
    max_points: usize,
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DURATION, DEFAULT_MAX_POINTS)
    }
}

impl TelemetryWindow {
    /// Creates an empty window.
    ///
    /// # Arguments
    ///
    /// * `duration` - Points this old or older relative to the newest insert are evicted
    /// * `max_points` - Hard cap on retained points (at least 1)
    #[must_use]
    pub fn new(duration: Duration, max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            points: VecDeque::with_capacity(max_points),
            duration,
            max_points,
        }
    }

    /// Appends a point, then evicts expired points and trims to `max_points`.
    pub fn insert(&mut self, value: f64, observed_at: Instant) {
        self.points.push_back(WindowPoint { value, observed_at });

        while let Some(oldest) = self.points.front() {
            if observed_at.saturating_duration_since(oldest.observed_at) >= self.duration {
                self.points.pop_front();
            } else {
                break;
            }
        }

        while self.points.len() > self.max_points {
            self.points.pop_front();
        }
    }

    /// Copy of the retained points, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WindowPoint> {
        self.points.iter().copied().collect()
    }

    /// Newest point, if any.
    #[must_use]
    pub fn latest(&self) -> Option<WindowPoint> {
        self.points.back().copied()
    }

    /// Smallest and largest retained value.
    #[must_use]
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |range, point| match range {
            None => Some((point.value, point.value)),
            Some((min, max)) => Some((min.min(point.value), max.max(point.value))),
        })
    }

    /// Number of retained points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the window holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drops all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Configured trailing duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Configured point cap.
    #[must_use]
    pub fn max_points(&self) -> usize {
        self.max_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, secs: u64) -> Instant {
        start + Duration::from_secs(secs)
    }

    #[test]
    fn test_old_points_are_evicted() {
        let start = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(10), 100);

        window.insert(1.0, at(start, 0));
        window.insert(2.0, at(start, 5));
        window.insert(3.0, at(start, 11));

        let points = window.snapshot();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].observed_at, at(start, 5));
        assert_eq!(points[1].observed_at, at(start, 11));
    }

    #[test]
    fn test_point_exactly_at_window_edge_is_evicted() {
        let start = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(10), 100);

        window.insert(1.0, at(start, 0));
        window.insert(2.0, at(start, 10));

        assert_eq!(window.len(), 1);
        assert_eq!(window.latest().map(|p| p.value), Some(2.0));
    }

    #[test]
    fn test_max_points_keeps_most_recent() {
        let start = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(3600), 3);

        for i in 0..5 {
            window.insert(i as f64, start + Duration::from_millis(i * 10));
        }

        let values: Vec<f64> = window.snapshot().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let start = Instant::now();
        let mut window = TelemetryWindow::default();

        window.insert(0.1, at(start, 1));
        window.insert(0.2, at(start, 2));
        let snapshot = window.snapshot();
        window.insert(0.3, at(start, 3));

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.windows(2).all(|w| w[0].observed_at <= w[1].observed_at));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_value_range() {
        let start = Instant::now();
        let mut window = TelemetryWindow::default();
        assert_eq!(window.value_range(), None);

        window.insert(0.5, at(start, 0));
        window.insert(-0.25, at(start, 1));
        window.insert(0.1, at(start, 2));

        assert_eq!(window.value_range(), Some((-0.25, 0.5)));
    }

    #[test]
    fn test_defaults_and_clear() {
        let mut window = TelemetryWindow::default();
        assert_eq!(window.duration(), Duration::from_secs(10));
        assert_eq!(window.max_points(), 100);

        window.insert(1.0, Instant::now());
        assert!(!window.is_empty());
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.latest(), None);
    }

    #[test]
    fn test_zero_max_points_is_clamped() {
        let mut window = TelemetryWindow::new(Duration::from_secs(10), 0);
        window.insert(1.0, Instant::now());
        assert_eq!(window.len(), 1);
    }
}
