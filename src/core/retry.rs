use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_SEQUENCE_MS: [u64; 5] = [1_000, 5_000, 10_000, 20_000, 45_000];

/// Delay policy consulted after a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    Fixed(Duration),
    /// Consumed position by position, pinned to the last element once exhausted.
    Sequence(Vec<Duration>),
}

impl RetryPolicy {
    fn delay_at(&self, cursor: usize) -> Duration {
        match self {
            RetryPolicy::Fixed(delay) => *delay,
            RetryPolicy::Sequence(delays) => delays
                .get(cursor)
                .or_else(|| delays.last())
                .copied()
                .unwrap_or_default(),
        }
    }

    fn last_index(&self) -> usize {
        match self {
            RetryPolicy::Fixed(_) => 0,
            RetryPolicy::Sequence(delays) => delays.len().saturating_sub(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Sequence(
            DEFAULT_SEQUENCE_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }
}

/// Config form of [`RetryPolicy`]: a single millisecond value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryDelays {
    Fixed(u64),
    Sequence(Vec<u64>),
}

impl RetryDelays {
    pub fn to_policy(&self) -> RetryPolicy {
        match self {
            RetryDelays::Fixed(ms) => RetryPolicy::Fixed(Duration::from_millis(*ms)),
            RetryDelays::Sequence(ms) if ms.len() == 1 => {
                RetryPolicy::Fixed(Duration::from_millis(ms[0]))
            }
            RetryDelays::Sequence(ms) => {
                RetryPolicy::Sequence(ms.iter().map(|v| Duration::from_millis(*v)).collect())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RetryDelays::Sequence(ms) if ms.is_empty())
    }

    pub fn has_zero(&self) -> bool {
        match self {
            RetryDelays::Fixed(ms) => *ms == 0,
            RetryDelays::Sequence(ms) => ms.contains(&0),
        }
    }
}

impl Default for RetryDelays {
    fn default() -> Self {
        RetryDelays::Sequence(DEFAULT_SEQUENCE_MS.to_vec())
    }
}

/// Per-entity position in the retry policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    cursor: usize,
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.cursor = 0;
        self.consecutive_failures = 0;
    }

    /// Consumes the delay at the cursor and advances it, saturating at the last index.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Duration {
        let delay = policy.delay_at(self.cursor);
        self.cursor = (self.cursor + 1).min(policy.last_index());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    /// The delay chosen by the most recent failure; zero while not backing off.
    ///
    /// After N consecutive failures this is `sequence[min(N, len) - 1]`.
    pub fn next_delay(&self, policy: &RetryPolicy) -> Duration {
        match self.consecutive_failures {
            0 => Duration::ZERO,
            n => policy.delay_at(n as usize - 1),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_in_backoff(&self) -> bool {
        self.consecutive_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> RetryPolicy {
        RetryDelays::Sequence(values.to_vec()).to_policy()
    }

    #[test]
    fn test_initial_state() {
        let state = RetryState::new();
        let policy = RetryPolicy::default();
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.next_delay(&policy), Duration::ZERO);
        assert!(!state.is_in_backoff());
    }

    #[test]
    fn test_next_delay_follows_failure_count() {
        let policy = ms(&[1_000, 5_000, 10_000]);
        let mut state = RetryState::new();

        state.record_failure(&policy);
        assert_eq!(state.next_delay(&policy), Duration::from_secs(1));
        state.record_failure(&policy);
        assert_eq!(state.next_delay(&policy), Duration::from_secs(5));

        for _ in 0..4 {
            state.record_failure(&policy);
        }
        assert_eq!(state.consecutive_failures(), 6);
        assert_eq!(state.next_delay(&policy), Duration::from_secs(10));

        state.record_success();
        assert_eq!(state.next_delay(&policy), Duration::ZERO);
    }

    #[test]
    fn test_zero_delays_detected() {
        assert!(RetryDelays::Fixed(0).has_zero());
        assert!(RetryDelays::Sequence(vec![1_000, 0]).has_zero());
        assert!(!RetryDelays::default().has_zero());
    }

    #[test]
    fn test_sequence_consumed_in_order() {
        let policy = ms(&[1_000, 5_000, 10_000, 20_000, 45_000]);
        let mut state = RetryState::new();

        let delays: Vec<u64> = (0..4)
            .map(|_| state.record_failure(&policy).as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1_000, 5_000, 10_000, 20_000]);
        assert_eq!(state.consecutive_failures(), 4);
    }

    #[test]
    fn test_sequence_saturates_at_last_delay() {
        let policy = ms(&[1_000, 5_000, 10_000]);
        let mut state = RetryState::new();

        for _ in 0..3 {
            state.record_failure(&policy);
        }
        assert_eq!(state.cursor(), 2);

        for _ in 0..10 {
            assert_eq!(state.record_failure(&policy), Duration::from_secs(10));
        }
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.consecutive_failures(), 13);
    }

    #[test]
    fn test_success_resets_cursor() {
        let policy = ms(&[1_000, 5_000, 10_000]);
        let mut state = RetryState::new();

        for _ in 0..7 {
            state.record_failure(&policy);
        }
        state.record_success();

        assert_eq!(state.cursor(), 0);
        assert!(!state.is_in_backoff());
        assert_eq!(state.record_failure(&policy), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_delay_never_changes() {
        let policy = RetryDelays::Fixed(2_500).to_policy();
        let mut state = RetryState::new();

        for _ in 0..5 {
            assert_eq!(state.record_failure(&policy), Duration::from_millis(2_500));
        }
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_single_element_list_is_fixed() {
        assert_eq!(
            ms(&[3_000]),
            RetryPolicy::Fixed(Duration::from_millis(3_000))
        );
    }

    #[test]
    fn test_parse_delays_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            retry_ms: RetryDelays,
        }

        let fixed: Wrapper = toml::from_str("retry_ms = 2500").unwrap();
        assert_eq!(fixed.retry_ms, RetryDelays::Fixed(2_500));

        let list: Wrapper = toml::from_str("retry_ms = [1000, 5000]").unwrap();
        assert_eq!(list.retry_ms, RetryDelays::Sequence(vec![1_000, 5_000]));
    }
}
