use std::time::{Duration, Instant};

/// Debounced push timer. Every [`schedule`](Self::schedule) resets the
/// deadline, so a burst of edits collapses into one push. Time is always
/// passed in, never read from the wall clock.
#[derive(Debug, Clone)]
pub struct PushScheduler {
    debounce: Duration,
    deadline: Option<Instant>,
}

impl PushScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the pending push fires.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Consumes the pending push once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(1200);

    #[test]
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut scheduler = PushScheduler::new(DEBOUNCE);
        scheduler.schedule(start);
        assert!(!scheduler.take_due(start + Duration::from_millis(1199)));
        assert!(scheduler.take_due(start + DEBOUNCE));
        assert!(!scheduler.take_due(start + DEBOUNCE * 2));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn rescheduling_resets_the_deadline() {
        let start = Instant::now();
        let mut scheduler = PushScheduler::new(DEBOUNCE);
        scheduler.schedule(start);
        scheduler.schedule(start + Duration::from_millis(1000));
        assert!(!scheduler.take_due(start + DEBOUNCE));
        assert_eq!(
            scheduler.remaining(start + DEBOUNCE),
            Some(Duration::from_millis(1000))
        );
        assert!(scheduler.take_due(start + Duration::from_millis(2200)));
    }

    #[test]
    fn cancel_drops_pending_push() {
        let start = Instant::now();
        let mut scheduler = PushScheduler::new(DEBOUNCE);
        assert!(!scheduler.cancel());
        scheduler.schedule(start);
        assert!(scheduler.cancel());
        assert!(!scheduler.take_due(start + DEBOUNCE));
    }
}
