//! Per-`(feature, tool)` auto-disable health tracking (spec.md §4.8). No
//! global singleton — this lives inside the session [`super::Store`].

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Success,
    Neutral,
    Hurt,
}

#[derive(Debug, Clone, Default)]
struct HealthState {
    regression_streak: u32,
    cooldown_remaining: u32,
}

#[derive(Default)]
pub struct HealthTracker {
    states: HashMap<(String, String), HealthState>,
}

impl HealthTracker {
    /// Consuming check: decrements an active cooldown and reports whether
    /// the feature should be bypassed for this call.
    pub fn is_disabled(&mut self, feature: &str, tool: &str) -> bool {
        let state = self
            .states
            .entry((feature.to_string(), tool.to_string()))
            .or_default();
        if state.cooldown_remaining > 0 {
            state.cooldown_remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn record_outcome(
        &mut self,
        feature: &str,
        tool: &str,
        outcome: HealthOutcome,
        threshold: u32,
        cooldown_requests: u32,
    ) {
        let state = self
            .states
            .entry((feature.to_string(), tool.to_string()))
            .or_default();
        match outcome {
            HealthOutcome::Success => state.regression_streak = 0,
            HealthOutcome::Neutral => {
                state.regression_streak = state.regression_streak.saturating_sub(1)
            }
            HealthOutcome::Hurt => {
                state.regression_streak += 1;
                if state.regression_streak >= threshold {
                    state.cooldown_remaining = cooldown_requests;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streak_reaching_threshold_triggers_cooldown() {
        let mut tracker = HealthTracker::default();
        for _ in 0..3 {
            tracker.record_outcome("result_compression", "list_items", HealthOutcome::Hurt, 3, 5);
        }
        assert!(tracker.is_disabled("result_compression", "list_items"));
    }

    #[test]
    fn success_resets_streak() {
        let mut tracker = HealthTracker::default();
        tracker.record_outcome("result_compression", "t", HealthOutcome::Hurt, 3, 5);
        tracker.record_outcome("result_compression", "t", HealthOutcome::Hurt, 3, 5);
        tracker.record_outcome("result_compression", "t", HealthOutcome::Success, 3, 5);
        tracker.record_outcome("result_compression", "t", HealthOutcome::Hurt, 3, 5);
        assert!(!tracker.is_disabled("result_compression", "t"));
    }

    #[test]
    fn cooldown_decrements_on_each_check_and_expires() {
        let mut tracker = HealthTracker::default();
        for _ in 0..3 {
            tracker.record_outcome("f", "t", HealthOutcome::Hurt, 3, 2);
        }
        assert!(tracker.is_disabled("f", "t"));
        assert!(tracker.is_disabled("f", "t"));
        assert!(!tracker.is_disabled("f", "t"));
    }
}
