use crate::Millis;

/// Tracks when the full table was last pushed out on the timer.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Millis,
    last_broadcast: Millis,
}

impl Heartbeat {
    pub fn new(interval: Millis) -> Self {
        Self {
            interval,
            last_broadcast: 0,
        }
    }

    pub fn interval(&self) -> Millis {
        self.interval
    }

    pub fn last_broadcast(&self) -> Millis {
        self.last_broadcast
    }

    /// Returns true, and records `now`, when a heartbeat is due.
    pub fn poll(&mut self, now: Millis) -> bool {
        if now.saturating_sub(self.last_broadcast) >= self.interval {
            self.last_broadcast = now;
            true
        } else {
            false
        }
    }
}
