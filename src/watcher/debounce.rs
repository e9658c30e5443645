//! Leading-plus-trailing event coalescing.
//!
//! A poke with no open window fires immediately and opens the window, so the
//! first change after a quiet period is handled instantly. Pokes inside the
//! window slide it and mark a pending trailing fire, delivered once when the
//! window elapses. A burst therefore costs at most two fires.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Coalesce {
    window: Duration,
    window_end: Option<Instant>,
    pending: bool,
}

impl Coalesce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_end: None,
            pending: false,
        }
    }

    /// Record an event. Returns true when the caller should fire now.
    pub fn poke(&mut self, now: Instant) -> bool {
        match self.window_end {
            Some(end) if now < end => {
                self.pending = true;
                self.window_end = Some(now + self.window);
                false
            }
            // No window, or an expired one (a pending fire in an expired
            // window is folded into this immediate fire, never lost)
            _ => {
                self.window_end = Some(now + self.window);
                self.pending = false;
                true
            }
        }
    }

    /// Check the window. Returns true when a pending trailing fire is due.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.window_end {
            Some(end) if now >= end => {
                self.window_end = None;
                std::mem::take(&mut self.pending)
            }
            _ => false,
        }
    }

    /// When the caller should next call [`due`](Self::due), if a window is
    /// open.
    pub fn deadline(&self) -> Option<Instant> {
        self.window_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_poke_fires_immediately() {
        let mut c = Coalesce::new(WINDOW);
        assert!(c.poke(Instant::now()));
    }

    #[test]
    fn test_burst_coalesces_to_leading_plus_trailing() {
        let t0 = Instant::now();
        let mut c = Coalesce::new(WINDOW);

        assert!(c.poke(t0));
        assert!(!c.poke(t0 + ms(100)));
        assert!(!c.poke(t0 + ms(200)));

        // Window slid to last poke + 500ms
        assert!(!c.due(t0 + ms(600)));
        assert!(c.due(t0 + ms(700)));

        // Nothing left after the trailing fire
        assert!(!c.due(t0 + ms(800)));
    }

    #[test]
    fn test_quiet_period_resets_to_leading_edge() {
        let t0 = Instant::now();
        let mut c = Coalesce::new(WINDOW);

        assert!(c.poke(t0));
        assert!(!c.due(t0 + ms(100)));
        // Window expires with nothing pending
        assert!(!c.due(t0 + ms(600)));
        // Next change is immediate again
        assert!(c.poke(t0 + ms(700)));
    }

    #[test]
    fn test_pending_fire_in_expired_window_not_lost() {
        let t0 = Instant::now();
        let mut c = Coalesce::new(WINDOW);

        assert!(c.poke(t0));
        assert!(!c.poke(t0 + ms(100)));
        // due() was never called; the next poke lands after expiry and
        // absorbs the pending fire
        assert!(c.poke(t0 + ms(1200)));
        assert!(!c.due(t0 + ms(1300)));
    }

    #[test]
    fn test_deadline_tracks_last_poke() {
        let t0 = Instant::now();
        let mut c = Coalesce::new(WINDOW);
        assert!(c.deadline().is_none());

        c.poke(t0);
        assert_eq!(c.deadline(), Some(t0 + WINDOW));

        c.poke(t0 + ms(200));
        assert_eq!(c.deadline(), Some(t0 + ms(200) + WINDOW));
    }
}
