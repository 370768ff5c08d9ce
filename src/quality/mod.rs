//! Quality and health scoring for orchestrator-level call outcomes.
//!
//! The tracker converts a stream of success/partial/failure events into a
//! single 0.0–1.0 score; the health score layers an error-volume penalty on
//! top. The two inputs deliberately double-count failure signal: silent
//! partial successes raise no error record but still depress the score, while
//! recorded errors depress health even when the call that caused them was
//! retried to success.

use serde::{Deserialize, Serialize};

/// Outcome of one orchestrator-level call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call fully succeeded.
    Success,
    /// The call produced a usable but degraded result.
    Partial,
    /// The call failed.
    Failure,
}

/// Accumulates call outcomes into a quality score.
///
/// Lifetime equals the owning orchestrator instance; only an explicit
/// [`reset`](Self::reset) clears the counters. The score is recomputed on
/// demand and never cached.
#[derive(Debug, Clone, Default)]
pub struct QualityTracker {
    successful: u64,
    partial: u64,
    failed: u64,
}

impl QualityTracker {
    /// Creates a tracker with zero recorded outcomes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one call outcome.
    pub fn record(&mut self, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Success => self.successful += 1,
            CallOutcome::Partial => self.partial += 1,
            CallOutcome::Failure => self.failed += 1,
        }
    }

    /// Records a fully successful call.
    pub fn record_success(&mut self) {
        self.record(CallOutcome::Success);
    }

    /// Records a partially successful call.
    pub fn record_partial(&mut self) {
        self.record(CallOutcome::Partial);
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.record(CallOutcome::Failure);
    }

    /// Number of successful calls.
    pub fn successful(&self) -> u64 {
        self.successful
    }

    /// Number of partially successful calls.
    pub fn partial(&self) -> u64 {
        self.partial
    }

    /// Number of failed calls.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Total number of recorded calls.
    pub fn total(&self) -> u64 {
        self.successful + self.partial + self.failed
    }

    /// Quality score in [0.0, 1.0], rounded to 3 decimals.
    ///
    /// Successes weigh 1.0, partials 0.5, failures 0.0. With no recorded
    /// work the score is 1.0 by convention.
    pub fn score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        let raw = (self.successful as f64 + self.partial as f64 * 0.5) / total as f64;
        (raw * 1000.0).round() / 1000.0
    }

    /// Clears all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Health score in [0.0, 100.0] derived from the quality score and the total
/// recorded error volume: `score * 100 - min(errors * 5, 30)`, clamped.
pub fn health_score(quality_score: f64, recorded_errors: u64) -> f64 {
    let penalty = (recorded_errors.saturating_mul(5)).min(30) as f64;
    (quality_score * 100.0 - penalty).clamp(0.0, 100.0)
}

/// Qualitative label derived from the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLabel {
    /// Health score of at least 80.
    Healthy,
    /// Health score of at least 50.
    Degraded,
    /// Anything below 50.
    Critical,
}

impl HealthLabel {
    /// Maps a health score to its label.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthLabel::Healthy
        } else if score >= 50.0 {
            HealthLabel::Degraded
        } else {
            HealthLabel::Critical
        }
    }
}

impl std::fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLabel::Healthy => write!(f, "healthy"),
            HealthLabel::Degraded => write!(f, "degraded"),
            HealthLabel::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_is_perfect() {
        let tracker = QualityTracker::new();
        assert_eq!(tracker.total(), 0);
        assert!((tracker.score() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_weights() {
        let mut tracker = QualityTracker::new();
        tracker.record_success();
        tracker.record_partial();
        tracker.record_failure();

        // (1.0 + 0.5 + 0.0) / 3 = 0.5
        assert!((tracker.score() - 0.5).abs() < f64::EPSILON);
        assert_eq!(tracker.total(), 3);
    }

    #[test]
    fn test_score_rounded_to_three_decimals() {
        let mut tracker = QualityTracker::new();
        tracker.record_success();
        tracker.record_success();
        tracker.record_failure();

        // 2/3 = 0.666666... rounds to 0.667
        assert!((tracker.score() - 0.667).abs() < f64::EPSILON);
    }

    #[test]
    fn test_only_failures_scores_zero() {
        let mut tracker = QualityTracker::new();
        for _ in 0..5 {
            tracker.record_failure();
        }
        assert!((tracker.score() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_always_in_bounds() {
        let mut tracker = QualityTracker::new();
        for i in 0..50 {
            match i % 3 {
                0 => tracker.record_success(),
                1 => tracker.record_partial(),
                _ => tracker.record_failure(),
            }
            let score = tracker.score();
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut tracker = QualityTracker::new();
        tracker.record_failure();
        tracker.reset();
        assert_eq!(tracker.total(), 0);
        assert!((tracker.score() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_penalty_capped() {
        assert!((health_score(1.0, 0) - 100.0).abs() < f64::EPSILON);
        assert!((health_score(1.0, 2) - 90.0).abs() < f64::EPSILON);
        // Penalty caps at 30 regardless of error volume.
        assert!((health_score(1.0, 6) - 70.0).abs() < f64::EPSILON);
        assert!((health_score(1.0, 1000) - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_monotone_in_errors() {
        let mut previous = f64::MAX;
        for errors in 0..10 {
            let score = health_score(0.8, errors);
            assert!(score <= previous);
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_health_clamped_at_zero() {
        assert!((health_score(0.0, 100) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_health_labels() {
        assert_eq!(HealthLabel::from_score(100.0), HealthLabel::Healthy);
        assert_eq!(HealthLabel::from_score(80.0), HealthLabel::Healthy);
        assert_eq!(HealthLabel::from_score(79.9), HealthLabel::Degraded);
        assert_eq!(HealthLabel::from_score(50.0), HealthLabel::Degraded);
        assert_eq!(HealthLabel::from_score(49.9), HealthLabel::Critical);
        assert_eq!(format!("{}", HealthLabel::Degraded), "degraded");
    }
}
