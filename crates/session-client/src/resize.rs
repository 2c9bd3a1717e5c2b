//! Resize coalescing.
//!
//! Dragging a window edge produces a burst of geometry changes. The first
//! change goes out immediately; changes inside the following interval
//! collapse into a single pending geometry that is flushed when the
//! interval ends. Only the most recent geometry is ever sent.

use std::time::Duration;

use protocol::TerminalSize;
use tokio::time::Instant;

/// Default coalescing interval.
pub const DEFAULT_RESIZE_INTERVAL: Duration = Duration::from_millis(50);

/// Leading-edge throttle with a trailing flush.
#[derive(Debug, Clone)]
pub struct ResizeThrottle {
    interval: Duration,
    last_sent: Option<(Instant, TerminalSize)>,
    pending: Option<TerminalSize>,
}

impl ResizeThrottle {
    /// Creates a throttle. A zero interval disables coalescing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
        }
    }

    /// The coalescing interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offers a new geometry.
    ///
    /// Returns the geometry to send right now, or `None` if it was stored
    /// as pending or matches what the remote already has.
    pub fn request(&mut self, size: TerminalSize, now: Instant) -> Option<TerminalSize> {
        match self.last_sent {
            Some((at, last)) if now < at + self.interval => {
                self.pending = (size != last).then_some(size);
                None
            }
            Some((_, last)) if last == size => {
                self.pending = None;
                None
            }
            _ => Some(self.mark_sent(size, now)),
        }
    }

    /// Sends `size` regardless of history, e.g. right after a connection opens.
    pub fn force(&mut self, size: TerminalSize, now: Instant) -> TerminalSize {
        self.mark_sent(size, now)
    }

    /// Returns the pending geometry once its interval has elapsed.
    pub fn flush(&mut self, now: Instant) -> Option<TerminalSize> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        let size = self.pending.take()?;
        Some(self.mark_sent(size, now))
    }

    /// When the pending geometry becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending?;
        match self.last_sent {
            Some((at, _)) => Some(at + self.interval),
            None => Some(Instant::now()),
        }
    }

    /// Forgets send history and pending geometry.
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.pending = None;
    }

    fn mark_sent(&mut self, size: TerminalSize, now: Instant) -> TerminalSize {
        self.last_sent = Some((now, size));
        self.pending = None;
        size
    }
}

impl Default for ResizeThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_RESIZE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_first_request_is_immediate() {
        let mut throttle = ResizeThrottle::default();
        let now = Instant::now();
        let size = TerminalSize::new(100, 30);
        assert_eq!(throttle.request(size, now), Some(size));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_burst_coalesces_to_latest() {
        let mut throttle = ResizeThrottle::new(50 * MS);
        let start = Instant::now();

        assert!(throttle.request(TerminalSize::new(100, 30), start).is_some());
        assert_eq!(throttle.request(TerminalSize::new(101, 30), start + 10 * MS), None);
        assert_eq!(throttle.request(TerminalSize::new(102, 31), start + 20 * MS), None);
        assert_eq!(throttle.request(TerminalSize::new(103, 32), start + 30 * MS), None);
        assert_eq!(throttle.deadline(), Some(start + 50 * MS));

        assert_eq!(throttle.flush(start + 40 * MS), None);
        assert_eq!(
            throttle.flush(start + 50 * MS),
            Some(TerminalSize::new(103, 32))
        );
        assert_eq!(throttle.flush(start + 200 * MS), None);
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_returning_to_sent_size_cancels_pending() {
        let mut throttle = ResizeThrottle::new(50 * MS);
        let start = Instant::now();
        let size = TerminalSize::new(80, 24);

        throttle.request(size, start);
        throttle.request(TerminalSize::new(90, 24), start + MS);
        throttle.request(size, start + 2 * MS);
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_identical_size_suppressed() {
        let mut throttle = ResizeThrottle::new(50 * MS);
        let start = Instant::now();
        let size = TerminalSize::new(80, 24);

        assert!(throttle.request(size, start).is_some());
        assert_eq!(throttle.request(size, start + 100 * MS), None);
    }

    #[test]
    fn test_zero_interval_sends_everything() {
        let mut throttle = ResizeThrottle::new(Duration::ZERO);
        let now = Instant::now();
        assert!(throttle.request(TerminalSize::new(81, 24), now).is_some());
        assert!(throttle.request(TerminalSize::new(82, 24), now).is_some());
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_force_and_reset() {
        let mut throttle = ResizeThrottle::new(50 * MS);
        let now = Instant::now();
        let size = TerminalSize::new(80, 24);

        throttle.request(size, now);
        assert_eq!(throttle.force(size, now + MS), size);

        throttle.reset();
        assert_eq!(throttle.request(size, now + 2 * MS), Some(size));
    }
}
