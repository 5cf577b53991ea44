//! Signal freshness tracking.
//!
//! Records, per bot, the most recent time a long or short bias was observed.
//! The stale-position check in the reconciler compares against these
//! timestamps to decide whether an unconfirmed position should be closed.

use super::types::Signal;
use chrono::{DateTime, Utc};

/// Last time each directional bias was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessState {
    pub last_long_signal_time: DateTime<Utc>,
    pub last_short_signal_time: DateTime<Utc>,
}

/// Tracks signal freshness across cycles. One tracker per bot, living as
/// long as the bot's engine instance; state is process-memory only.
#[derive(Debug)]
pub struct FreshnessTracker {
    state: FreshnessState,
}

impl FreshnessTracker {
    /// Both timestamps start at "now" so a freshly started bot does not
    /// immediately close a position it has just been handed.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: FreshnessState {
                last_long_signal_time: now,
                last_short_signal_time: now,
            },
        }
    }

    /// Fold a whole signal batch into the freshness state.
    ///
    /// The entire batch is scanned, not just the newest entry: one poll may
    /// return several signals, and a directional flag on an older entry must
    /// not be lost to a later neutral signal in the same batch. Each
    /// timestamp becomes the newest `prediction_time` among matching signals,
    /// or stays unchanged when the batch carries none.
    pub fn update(&mut self, batch: &[Signal]) -> FreshnessState {
        if let Some(t) = batch
            .iter()
            .filter(|s| s.long)
            .map(|s| s.prediction_time)
            .max()
        {
            self.state.last_long_signal_time = t;
        }
        if let Some(t) = batch
            .iter()
            .filter(|s| s.short)
            .map(|s| s.prediction_time)
            .max()
        {
            self.state.last_short_signal_time = t;
        }
        self.state
    }

    pub fn state(&self) -> FreshnessState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::types::Signal;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn signal_at(ts: i64, long: bool, short: bool) -> Signal {
        Signal {
            symbol: "ETH".to_string(),
            long,
            short,
            horizon_min: 240,
            stop_loss_pct: dec!(5),
            take_profit_pct: dec!(10),
            prediction_time: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn test_long_time_is_batch_maximum() {
        let mut tracker = FreshnessTracker::new(at(0));
        let state = tracker.update(&[
            signal_at(100, true, false),
            signal_at(200, true, false),
            signal_at(300, false, false),
        ]);
        assert_eq!(state.last_long_signal_time, at(200));
        assert_eq!(state.last_short_signal_time, at(0));
    }

    #[test]
    fn test_unchanged_when_no_matching_flag() {
        let mut tracker = FreshnessTracker::new(at(50));
        let state = tracker.update(&[signal_at(100, false, false), signal_at(200, false, false)]);
        assert_eq!(state.last_long_signal_time, at(50));
        assert_eq!(state.last_short_signal_time, at(50));
    }

    #[test]
    fn test_older_directional_entry_not_lost_to_newer_neutral() {
        let mut tracker = FreshnessTracker::new(at(0));
        // The short flag sits on the older entry; the newest entry is neutral.
        let state = tracker.update(&[signal_at(100, false, true), signal_at(500, false, false)]);
        assert_eq!(state.last_short_signal_time, at(100));
    }

    #[test]
    fn test_both_flags_tracked_independently() {
        let mut tracker = FreshnessTracker::new(at(0));
        let state = tracker.update(&[signal_at(100, true, false), signal_at(150, false, true)]);
        assert_eq!(state.last_long_signal_time, at(100));
        assert_eq!(state.last_short_signal_time, at(150));
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let mut tracker = FreshnessTracker::new(at(42));
        let state = tracker.update(&[]);
        assert_eq!(state.last_long_signal_time, at(42));
        assert_eq!(state.last_short_signal_time, at(42));
    }
}
