//! Cancellation window: how long a customer may cancel without a fee.
//!
//! [`cancellation_state`] is a pure function of `created_at` and `now`. A live
//! countdown is produced by calling it again on every tick of the
//! [`CountdownTicker`], never by decrementing a counter.

mod penalty;
mod ticker;

pub use penalty::*;
pub use ticker::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Length of the penalty-free window.
pub const PENALTY_FREE_WINDOW: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationState {
    pub remaining_seconds: u64,
    pub is_penalty_free: bool,
}

/// Cancellation state for the standard ten minute window.
pub fn cancellation_state(created_at: i64, now: i64) -> CancellationState {
    cancellation_state_with_window(created_at, now, PENALTY_FREE_WINDOW)
}

/// Cancellation state for an arbitrary window. Elapsed time is floored to
/// whole seconds; a `now` before `created_at` counts as zero elapsed.
pub fn cancellation_state_with_window(created_at: i64, now: i64, window: Duration) -> CancellationState {
    let elapsed_secs = u64::try_from(now.saturating_sub(created_at).max(0) / 1000).unwrap_or(0);
    let remaining_seconds = window.as_secs().saturating_sub(elapsed_secs);
    CancellationState {
        remaining_seconds,
        is_penalty_free: remaining_seconds > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn full_window_at_creation() {
        let state = cancellation_state(T0, T0);
        assert_eq!(state.remaining_seconds, 600);
        assert!(state.is_penalty_free);
    }

    #[test]
    fn elapsed_time_is_floored() {
        assert_eq!(cancellation_state(T0, T0 + 999).remaining_seconds, 600);
        assert_eq!(cancellation_state(T0, T0 + 1_000).remaining_seconds, 599);
        assert_eq!(cancellation_state(T0, T0 + 599_999).remaining_seconds, 1);
    }

    #[test]
    fn window_closes_at_ten_minutes() {
        let closed = cancellation_state(T0, T0 + 600_000);
        assert_eq!(closed, CancellationState { remaining_seconds: 0, is_penalty_free: false });
        assert_eq!(cancellation_state(T0, T0 + 3_600_000).remaining_seconds, 0);
    }

    #[test]
    fn clock_skew_does_not_extend_the_window() {
        assert_eq!(cancellation_state(T0, T0 - 50_000).remaining_seconds, 600);
    }

    #[test]
    fn pure_and_non_increasing() {
        let mut previous = u64::MAX;
        for offset in (0..700_000).step_by(3_337) {
            let first = cancellation_state(T0, T0 + offset);
            assert_eq!(first, cancellation_state(T0, T0 + offset));
            assert!(first.remaining_seconds <= previous);
            previous = first.remaining_seconds;
        }
    }

    #[test]
    fn configured_window() {
        let state = cancellation_state_with_window(T0, T0 + 30_000, Duration::from_secs(60));
        assert_eq!(state.remaining_seconds, 30);
    }
}
