use std::time::Duration;

/// Quadratic retry spacing: the n-th throttled dispatch waits `n² × base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Option<Duration>) -> Self {
        Self { base, max, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Bumps the counter, then returns the delay for that attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base.saturating_mul(self.attempt.saturating_mul(self.attempt));
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_quadratically() {
        let mut b = Backoff::new(Duration::from_millis(100), None);
        let delays: Vec<u128> = (0..4).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 400, 900, 1600]);
        assert_eq!(b.attempt(), 4);
    }

    #[test]
    fn reset_starts_over() {
        let mut b = Backoff::new(Duration::from_millis(10), None);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn cap_bounds_the_delay() {
        let mut b = Backoff::new(Duration::from_secs(1), Some(Duration::from_secs(5)));
        let delays: Vec<u64> = (0..4).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 4, 5, 5]);
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let mut b = Backoff::new(Duration::from_secs(1), None);
        b.attempt = u32::MAX - 1;
        assert!(b.next_delay() >= Duration::from_secs(u64::from(u32::MAX)));
    }
}
