//! Ghost Score computation and record transitions
//!
//! The score is an additive point budget:
//!
//! | Component     | Max | Rule                                            |
//! |---------------|-----|-------------------------------------------------|
//! | Success rate  | 300 | success % x 3                                   |
//! | Rating        | 200 | rating / 5 x 200                                |
//! | Experience    | 200 | 2 per completed job                             |
//! | Response time | 150 | <=60s 150, <=300s 100, <=900s 50                |
//! | Completion    | 100 | <=1h 100, <=24h 50                              |
//! | Verification  |  25 | admin verified                                  |
//! | Integration   |  25 | at least one third-party integration event      |
//!
//! The floor of the sum, clamped to 1000, is the Ghost Score.

use chrono::{DateTime, Utc};
use ghostspeak_types::{GhostSpeakError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::record::{ReputationRecord, ReputationTag, ReputationTier, MAX_SCORE};

const MAX_RATING: f64 = 5.0;
const SUCCESS_WEIGHT: f64 = 3.0;
const RATING_POINTS: f64 = 200.0;
const POINTS_PER_COMPLETED_JOB: u64 = 2;
const EXPERIENCE_CAP: u64 = 200;
const VERIFICATION_POINTS: f64 = 25.0;
const INTEGRATION_POINTS: f64 = 25.0;

/// Inputs to the score formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetrics {
    /// Percentage, 0-100
    pub success_rate: f64,
    /// 0-5
    pub average_rating: f64,
    pub completed_jobs: u64,
    pub response_time_seconds: f64,
    pub completion_time_seconds: f64,
    pub admin_verified: bool,
    pub has_integration: bool,
}

impl From<&ReputationRecord> for ScoreMetrics {
    fn from(record: &ReputationRecord) -> Self {
        Self {
            success_rate: record.success_rate,
            average_rating: record.average_rating,
            completed_jobs: record.completed_jobs,
            response_time_seconds: record.response_time_seconds,
            completion_time_seconds: record.completion_time_seconds,
            admin_verified: record.admin_verified,
            has_integration: record.integration_events > 0,
        }
    }
}

/// Per-component points, for explaining a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub success: f64,
    pub rating: f64,
    pub experience: f64,
    pub response_time: f64,
    pub completion_time: f64,
    pub verification: f64,
    pub integration: f64,
    /// Floor of the sum, clamped to 1000
    pub total: u32,
}

/// A completed job as observed by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    /// Client rating, 0-5
    pub rating: f64,
    /// Payment received in base units
    pub amount: u64,
    pub response_time_seconds: f64,
    pub completion_time_seconds: f64,
}

/// Events from outside the job lifecycle that affect standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntegrationEvent {
    /// A protocol administrator verified the agent
    AdminVerified,
    /// A third-party platform reported activity for the agent
    ThirdParty { source: String },
}

/// Reputation engine
///
/// Stateless: every operation takes a record and returns a new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReputationEngine;

impl ReputationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score broken down by component
    pub fn score_breakdown(&self, metrics: &ScoreMetrics) -> ScoreBreakdown {
        let success = metrics.success_rate.clamp(0.0, 100.0) * SUCCESS_WEIGHT;
        let rating = metrics.average_rating.clamp(0.0, MAX_RATING) / MAX_RATING * RATING_POINTS;
        let experience = metrics
            .completed_jobs
            .saturating_mul(POINTS_PER_COMPLETED_JOB)
            .min(EXPERIENCE_CAP) as f64;

        // Timing averages are meaningless until a job has been completed.
        let (response_time, completion_time) = if metrics.completed_jobs > 0 {
            (
                response_points(metrics.response_time_seconds),
                completion_points(metrics.completion_time_seconds),
            )
        } else {
            (0.0, 0.0)
        };

        let verification = if metrics.admin_verified { VERIFICATION_POINTS } else { 0.0 };
        let integration = if metrics.has_integration { INTEGRATION_POINTS } else { 0.0 };

        let sum = success + rating + experience + response_time + completion_time + verification + integration;
        let total = (sum.floor().max(0.0) as u32).min(MAX_SCORE);

        ScoreBreakdown {
            success,
            rating,
            experience,
            response_time,
            completion_time,
            verification,
            integration,
            total,
        }
    }

    /// Ghost Score in [0, 1000]
    pub fn compute_score(&self, metrics: &ScoreMetrics) -> u32 {
        self.score_breakdown(metrics).total
    }

    /// Tier band for a score
    pub fn determine_tier(&self, score: u32) -> ReputationTier {
        ReputationTier::from_score(score)
    }

    /// Tags for a record, using its current derived score
    pub fn determine_tags(&self, record: &ReputationRecord) -> BTreeSet<ReputationTag> {
        tags_for(record, record.score)
    }

    /// Record a successful job
    pub fn apply_job_completion(
        &self,
        record: &ReputationRecord,
        job: &JobCompletion,
        now: DateTime<Utc>,
    ) -> Result<ReputationRecord> {
        validate_job(job)?;

        let mut next = record.clone();
        next.total_jobs += 1;
        next.completed_jobs += 1;

        // Divisor is the post-increment completed count.
        let n = next.completed_jobs as f64;
        next.average_rating = rolling(next.average_rating, job.rating, n);
        next.response_time_seconds = rolling(next.response_time_seconds, job.response_time_seconds, n);
        next.completion_time_seconds =
            rolling(next.completion_time_seconds, job.completion_time_seconds, n);
        next.total_earnings = next
            .total_earnings
            .checked_add(job.amount)
            .ok_or(GhostSpeakError::AmountOverflow)?;
        next.updated_at = now;

        refresh_derived(&mut next);
        info!(
            subject = %next.subject,
            completed = next.completed_jobs,
            score = next.score,
            tier = %next.tier,
            "job completion applied"
        );
        Ok(next)
    }

    /// Record a failed job
    pub fn apply_job_failure(&self, record: &ReputationRecord, now: DateTime<Utc>) -> ReputationRecord {
        let mut next = record.clone();
        next.total_jobs += 1;
        next.failed_jobs += 1;
        next.updated_at = now;

        refresh_derived(&mut next);
        info!(
            subject = %next.subject,
            failed = next.failed_jobs,
            score = next.score,
            "job failure applied"
        );
        next
    }

    /// Record an admin verification or third-party integration
    pub fn apply_integration_event(
        &self,
        record: &ReputationRecord,
        event: &IntegrationEvent,
        now: DateTime<Utc>,
    ) -> ReputationRecord {
        let mut next = record.clone();
        match event {
            IntegrationEvent::AdminVerified => {
                if !next.admin_verified {
                    next.admin_verified = true;
                    next.verified_at = Some(now);
                }
            }
            IntegrationEvent::ThirdParty { source } => {
                next.integration_events += 1;
                debug!(subject = %next.subject, source = %source, "third-party integration event");
            }
        }
        next.updated_at = now;

        refresh_derived(&mut next);
        info!(subject = %next.subject, score = next.score, "integration event applied");
        next
    }
}

/// Recompute every derived field from the counters
pub(crate) fn refresh_derived(record: &mut ReputationRecord) {
    record.success_rate = if record.total_jobs == 0 {
        0.0
    } else {
        record.completed_jobs as f64 / record.total_jobs as f64 * 100.0
    };
    record.average_earnings = if record.completed_jobs == 0 {
        0
    } else {
        record.total_earnings / record.completed_jobs
    };

    let engine = ReputationEngine;
    record.score = engine.compute_score(&ScoreMetrics::from(&*record));
    record.tier = ReputationTier::from_score(record.score);
    record.tags = tags_for(record, record.score);
}

fn tags_for(record: &ReputationRecord, score: u32) -> BTreeSet<ReputationTag> {
    let mut tags = BTreeSet::new();
    if record.admin_verified {
        tags.insert(ReputationTag::Verified);
    }
    if record.total_jobs < 10 {
        tags.insert(ReputationTag::Newcomer);
    } else if record.total_jobs >= 100 {
        tags.insert(ReputationTag::Experienced);
    }
    if record.success_rate >= 95.0 {
        tags.insert(ReputationTag::HighPerformer);
    }
    if record.success_rate >= 90.0 && record.total_jobs >= 50 {
        tags.insert(ReputationTag::Reliable);
    }
    if score >= 800 && record.admin_verified {
        tags.insert(ReputationTag::Trusted);
    }
    tags
}

fn response_points(seconds: f64) -> f64 {
    if seconds <= 60.0 {
        150.0
    } else if seconds <= 300.0 {
        100.0
    } else if seconds <= 900.0 {
        50.0
    } else {
        0.0
    }
}

fn completion_points(seconds: f64) -> f64 {
    if seconds <= 3_600.0 {
        100.0
    } else if seconds <= 86_400.0 {
        50.0
    } else {
        0.0
    }
}

fn rolling(previous: f64, sample: f64, count: f64) -> f64 {
    (previous * (count - 1.0) + sample) / count
}

fn validate_job(job: &JobCompletion) -> Result<()> {
    if !job.rating.is_finite() || !(0.0..=MAX_RATING).contains(&job.rating) {
        return Err(GhostSpeakError::invalid_input("rating", "must be between 0 and 5"));
    }
    if !job.response_time_seconds.is_finite() || job.response_time_seconds < 0.0 {
        return Err(GhostSpeakError::invalid_input(
            "response_time_seconds",
            "must be a non-negative number",
        ));
    }
    if !job.completion_time_seconds.is_finite() || job.completion_time_seconds < 0.0 {
        return Err(GhostSpeakError::invalid_input(
            "completion_time_seconds",
            "must be a non-negative number",
        ));
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_metrics() -> impl Strategy<Value = ScoreMetrics> {
        (
            0.0f64..=100.0,
            0.0f64..=5.0,
            0u64..10_000,
            0.0f64..100_000.0,
            0.0f64..200_000.0,
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(sr, rating, jobs, resp, comp, verified, integ)| ScoreMetrics {
                success_rate: sr,
                average_rating: rating,
                completed_jobs: jobs,
                response_time_seconds: resp,
                completion_time_seconds: comp,
                admin_verified: verified,
                has_integration: integ,
            })
    }

    proptest! {
        /// The score never leaves [0, 1000].
        #[test]
        fn score_is_bounded(m in any_metrics()) {
            let score = ReputationEngine::new().compute_score(&m);
            prop_assert!(score <= MAX_SCORE);
        }

        /// Tier is a non-decreasing step function of score.
        #[test]
        fn tier_is_monotonic(a in 0u32..=1_000, b in 0u32..=1_000) {
            let engine = ReputationEngine::new();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(engine.determine_tier(lo) <= engine.determine_tier(hi));
        }
    }
}
