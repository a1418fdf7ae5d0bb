//! Per-minute request throttle
//!
//! Hard sliding-window ceiling, not a token bucket: exceeding the configured
//! requests-per-minute costs a full one-minute wait regardless of margin.
//! The window is pure state; the pipeline performs the sleep and then calls
//! [`ThrottleWindow::restart`].

use std::time::{Duration, Instant};

/// Length of the throttle window, and of the penalty wait.
pub const WINDOW: Duration = Duration::from_secs(60);

pub struct ThrottleWindow {
    ceiling: Option<u32>,
    window_start: Instant,
    count: u32,
}

impl ThrottleWindow {
    /// `None` disables throttling entirely.
    pub fn new(ceiling: Option<u32>) -> Self {
        Self {
            ceiling,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Account for one admission. `Some(wait)` means the ceiling was
    /// breached: the caller must suspend for `wait` and then call
    /// [`restart`](Self::restart).
    ///
    /// A request arriving more than a window after the last reset opens a
    /// fresh window and is admitted without being counted.
    pub fn admit(&mut self, now: Instant) -> Option<Duration> {
        let ceiling = self.ceiling?;
        if now.duration_since(self.window_start) > WINDOW {
            self.window_start = now;
            self.count = 0;
            return None;
        }
        self.count += 1;
        (self.count > ceiling).then_some(WINDOW)
    }

    /// Open a fresh window after an enforced wait.
    pub fn restart(&mut self, now: Instant) {
        self.window_start = now;
        self.count = 0;
    }

    #[cfg(test)]
    fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_window_admits_everything() {
        let mut window = ThrottleWindow::new(None);
        let now = Instant::now();
        for _ in 0..1000 {
            assert_eq!(window.admit(now), None);
        }
    }

    #[test]
    fn ceiling_plus_one_within_window_demands_one_minute_wait() {
        let mut window = ThrottleWindow::new(Some(3));
        let now = Instant::now();
        assert_eq!(window.admit(now), None);
        assert_eq!(window.admit(now), None);
        assert_eq!(window.admit(now), None);
        assert_eq!(window.admit(now), Some(WINDOW));
    }

    #[test]
    fn restart_zeroes_the_count() {
        let mut window = ThrottleWindow::new(Some(1));
        let now = Instant::now();
        window.admit(now);
        assert_eq!(window.admit(now), Some(WINDOW));
        let after_wait = now + WINDOW;
        window.restart(after_wait);
        assert_eq!(window.count(), 0);
        assert_eq!(window.admit(after_wait), None);
    }

    #[test]
    fn stale_window_resets_instead_of_counting() {
        let mut window = ThrottleWindow::new(Some(1));
        let now = Instant::now();
        window.admit(now);
        // Just past the window boundary: fresh window, admission not counted.
        let later = now + WINDOW + Duration::from_secs(1);
        assert_eq!(window.admit(later), None);
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn requests_straddling_windows_do_not_accumulate() {
        let mut window = ThrottleWindow::new(Some(2));
        let t0 = Instant::now();
        assert_eq!(window.admit(t0), None);
        assert_eq!(window.admit(t0), None);
        let t1 = t0 + WINDOW + Duration::from_secs(5);
        assert_eq!(window.admit(t1), None);
        assert_eq!(window.admit(t1), None);
        assert_eq!(window.admit(t1), None);
        // Only now is the new window's ceiling breached.
        assert_eq!(window.admit(t1), Some(WINDOW));
    }
}
