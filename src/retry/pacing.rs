use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

/// Hard ceiling for the adaptive interval
const MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Growth factor applied when the upstream reports a rate limit
const PENALTY_FACTOR: f64 = 1.5;

/// Decay factor applied on success, floored at the configured baseline
const DECAY_FACTOR: f64 = 0.9;

struct PacerState {
    /// Earliest instant the next call may start
    next_slot: Option<Instant>,
    min_interval: Duration,
}

/// Per-client pacing state enforcing a minimum interval between call
/// starts. The interval adapts: rate-limit responses grow it by 50%
/// (capped at 2 s), sustained success decays it back to the baseline.
///
/// The lock is only held for interval arithmetic; sleeping happens after
/// the slot is reserved, so concurrent callers are spaced out without a
/// lock held across a suspension point.
pub struct Pacer {
    state: Mutex<PacerState>,
    baseline: Duration,
}

impl Pacer {
    /// Create a pacer with the given baseline minimum interval
    pub fn new(baseline: Duration) -> Self {
        Pacer {
            state: Mutex::new(PacerState {
                next_slot: None,
                min_interval: baseline,
            }),
            baseline,
        }
    }

    /// Wait until the caller's reserved slot. The first call passes
    /// through immediately.
    pub async fn pause(&self) {
        let wait = {
            let mut state = self.state.lock().expect("pacer lock poisoned");
            let now = Instant::now();
            let slot = match state.next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            state.next_slot = Some(slot + state.min_interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Grow the interval after a rate-limit classification
    pub fn penalize(&self) {
        let mut state = self.state.lock().expect("pacer lock poisoned");
        let grown = state.min_interval.mul_f64(PENALTY_FACTOR);
        state.min_interval = grown.min(MAX_INTERVAL);
        debug!(
            "Pacer interval increased to {:?} after rate limit",
            state.min_interval
        );
    }

    /// Decay the interval toward the baseline after a success
    pub fn reward(&self) {
        let mut state = self.state.lock().expect("pacer lock poisoned");
        if state.min_interval > self.baseline {
            let decayed = state.min_interval.mul_f64(DECAY_FACTOR);
            state.min_interval = decayed.max(self.baseline);
        }
    }

    /// Current minimum interval between call starts
    pub fn current_interval(&self) -> Duration {
        self.state.lock().expect("pacer lock poisoned").min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_passes_through() {
        let pacer = Pacer::new(Duration::from_millis(50));

        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_back_to_back_calls_are_spaced() {
        let pacer = Pacer::new(Duration::from_millis(40));

        let start = Instant::now();
        pacer.pause().await;
        pacer.pause().await;
        pacer.pause().await;

        // Three call starts need at least two full intervals between them
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[test]
    fn test_penalty_grows_interval_by_half() {
        let pacer = Pacer::new(Duration::from_millis(400));

        pacer.penalize();
        assert_eq!(pacer.current_interval(), Duration::from_millis(600));

        pacer.penalize();
        assert_eq!(pacer.current_interval(), Duration::from_millis(900));
    }

    #[test]
    fn test_penalty_is_capped_at_two_seconds() {
        let pacer = Pacer::new(Duration::from_millis(400));

        for _ in 0..20 {
            pacer.penalize();
        }
        assert_eq!(pacer.current_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_reward_decays_back_to_baseline() {
        let pacer = Pacer::new(Duration::from_millis(400));

        pacer.penalize();
        assert!(pacer.current_interval() > Duration::from_millis(400));

        for _ in 0..50 {
            pacer.reward();
        }
        assert_eq!(pacer.current_interval(), Duration::from_millis(400));
    }

    #[test]
    fn test_reward_never_drops_below_baseline() {
        let pacer = Pacer::new(Duration::from_millis(400));

        pacer.reward();
        pacer.reward();
        assert_eq!(pacer.current_interval(), Duration::from_millis(400));
    }
}
