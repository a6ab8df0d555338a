//! Reputation record, tiers and tags

use chrono::{DateTime, Utc};
use ghostspeak_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Highest attainable Ghost Score
pub const MAX_SCORE: u32 = 1_000;

/// Ordered reputation band derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    /// [0, 400)
    Bronze,
    /// [400, 600)
    Silver,
    /// [600, 800)
    Gold,
    /// [800, 1000]
    Platinum,
}

impl ReputationTier {
    /// Band for a score; lower bounds are inclusive
    pub fn from_score(score: u32) -> Self {
        if score >= 800 {
            Self::Platinum
        } else if score >= 600 {
            Self::Gold
        } else if score >= 400 {
            Self::Silver
        } else {
            Self::Bronze
        }
    }

    /// Inclusive lower bound of the band
    pub fn min_score(&self) -> u32 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 400,
            Self::Gold => 600,
            Self::Platinum => 800,
        }
    }
}

impl fmt::Display for ReputationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        };
        f.write_str(s)
    }
}

/// Qualitative label attached to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTag {
    Verified,
    Newcomer,
    Experienced,
    HighPerformer,
    Reliable,
    Trusted,
}

/// Performance history and derived standing of one agent
///
/// `score`, `tier` and `tags` are private: they are recomputed from the other
/// fields on every mutation and can only be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Agent the record describes
    pub subject: Address,
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    /// Rolling average rating, 0-5
    pub average_rating: f64,
    /// Rolling average time to first response
    pub response_time_seconds: f64,
    /// Rolling average time to completion
    pub completion_time_seconds: f64,
    /// Completed / total, as a percentage
    pub success_rate: f64,
    /// Lifetime earnings in base units
    pub total_earnings: u64,
    /// Earnings per completed job in base units
    pub average_earnings: u64,
    pub admin_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    /// Third-party integration events observed
    pub integration_events: u64,
    pub(crate) score: u32,
    pub(crate) tier: ReputationTier,
    pub(crate) tags: BTreeSet<ReputationTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReputationRecord {
    /// A fresh record for a subject first seen at `now`
    pub fn new(subject: Address, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            subject,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            average_rating: 0.0,
            response_time_seconds: 0.0,
            completion_time_seconds: 0.0,
            success_rate: 0.0,
            total_earnings: 0,
            average_earnings: 0,
            admin_verified: false,
            verified_at: None,
            integration_events: 0,
            score: 0,
            tier: ReputationTier::Bronze,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        crate::engine::refresh_derived(&mut record);
        record
    }

    /// Ghost Score, 0-1000
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Tier derived from the score
    pub fn tier(&self) -> ReputationTier {
        self.tier
    }

    /// Tags derived from the record
    pub fn tags(&self) -> &BTreeSet<ReputationTag> {
        &self.tags
    }

    /// Whether a tag is present
    pub fn has_tag(&self, tag: ReputationTag) -> bool {
        self.tags.contains(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ReputationTier::from_score(0), ReputationTier::Bronze);
        assert_eq!(ReputationTier::from_score(399), ReputationTier::Bronze);
        assert_eq!(ReputationTier::from_score(400), ReputationTier::Silver);
        assert_eq!(ReputationTier::from_score(599), ReputationTier::Silver);
        assert_eq!(ReputationTier::from_score(600), ReputationTier::Gold);
        assert_eq!(ReputationTier::from_score(800), ReputationTier::Platinum);
        assert_eq!(ReputationTier::from_score(1_000), ReputationTier::Platinum);
    }

    #[test]
    fn test_tier_serializes_snake_case() {
        let json = serde_json::to_string(&ReputationTier::Platinum).unwrap();
        assert_eq!(json, "\"platinum\"");
        let tag = serde_json::to_string(&ReputationTag::HighPerformer).unwrap();
        assert_eq!(tag, "\"high_performer\"");
    }

    #[test]
    fn test_new_record_is_newcomer() {
        let record = ReputationRecord::new(Address::parse(&"A".repeat(32)).unwrap(), Utc::now());
        assert_eq!(record.score(), 0);
        assert_eq!(record.tier(), ReputationTier::Bronze);
        assert!(record.has_tag(ReputationTag::Newcomer));
        assert_eq!(record.tags().len(), 1);
    }
}
