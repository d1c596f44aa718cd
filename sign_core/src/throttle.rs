use std::time::{Duration, Instant};

/// Drops callbacks that arrive faster than the target rate.
///
/// The last-accepted timestamp advances along the ideal slot grid while the
/// source keeps up, so a 60 Hz source with slightly short periods (16 ms)
/// still yields the full target rate. After a stall of two or more intervals
/// the grid is re-anchored to `now` instead of bursting to catch up.
/// The interval is measured from the recorded slot, not from the previous
/// accepted callback, so two accepted callbacks can sit slightly closer than
/// one interval apart.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(target_fps: u32) -> Self {
        let fps = target_fps.max(1);
        Self {
            interval: Duration::from_secs(1) / fps,
            last_accepted: None,
        }
    }

    /// Returns true if a frame arriving at `now` should be processed.
    pub fn accept(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_accepted else {
            self.last_accepted = Some(now);
            return true;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.interval {
            return false;
        }

        self.last_accepted = Some(if elapsed < self.interval * 2 {
            last + self.interval
        } else {
            now
        });
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_accepted(period_ms: u64, total_ms: u64, fps: u32) -> usize {
        let start = Instant::now();
        let mut throttle = FrameThrottle::new(fps);
        (0..total_ms / period_ms)
            .filter(|i| throttle.accept(start + Duration::from_millis(i * period_ms)))
            .count()
    }

    #[test]
    fn test_first_frame_accepted() {
        let mut t = FrameThrottle::new(30);
        assert!(t.accept(Instant::now()));
    }

    #[test]
    fn test_rejects_early_frames() {
        let start = Instant::now();
        let mut t = FrameThrottle::new(30);
        assert!(t.accept(start));
        assert!(!t.accept(start + Duration::from_millis(16)));
        assert!(!t.accept(start + Duration::from_millis(33)));
        assert!(t.accept(start + Duration::from_millis(34)));
    }

    #[test]
    fn test_60hz_source_throttled_to_30fps() {
        let n = count_accepted(16, 2000, 30);
        assert!((58..=62).contains(&n), "accepted {} frames", n);
    }

    #[test]
    fn test_slow_source_passes_through() {
        // 20 Hz is below the target, every frame is kept
        assert_eq!(count_accepted(50, 1000, 30), 20);
    }

    #[test]
    fn test_interval_measured_from_slot() {
        let start = Instant::now();
        let ms = |n| start + Duration::from_millis(n);
        let mut t = FrameThrottle::new(30);
        assert!(t.accept(ms(0)));
        assert!(!t.accept(ms(16)));
        assert!(!t.accept(ms(32)));
        // slot recorded at 33.3 ms, not 48 ms
        assert!(t.accept(ms(48)));
        assert!(!t.accept(ms(64)));
        assert!(t.accept(ms(80)));
    }

    #[test]
    fn test_no_burst_after_stall() {
        let start = Instant::now();
        let mut t = FrameThrottle::new(30);
        assert!(t.accept(start));
        assert!(t.accept(start + Duration::from_millis(500)));
        assert!(!t.accept(start + Duration::from_millis(516)));
    }
}
