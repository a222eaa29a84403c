use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{EmotionLabel, EmotionVector};

/// Kind of entity that owns an emotion profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Member,
    Movie,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Member => "member",
            OwnerKind::Movie => "movie",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" | "members" => Some(OwnerKind::Member),
            "movie" | "movies" => Some(OwnerKind::Movie),
            _ => None,
        }
    }
}

/// Identifies one profile owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn member(id: i64) -> Self {
        Self {
            kind: OwnerKind::Member,
            id,
        }
    }

    pub fn movie(id: i64) -> Self {
        Self {
            kind: OwnerKind::Movie,
            id,
        }
    }
}

impl Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Aggregate emotion profile of a member or movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub owner: OwnerRef,
    pub vector: EmotionVector,
    pub dominant: EmotionLabel,
    /// Number of samples the vector was averaged over
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Builds a profile as the mean of `samples`
    pub fn from_samples(owner: OwnerRef, samples: &[EmotionVector]) -> Self {
        let vector = EmotionVector::mean(samples);
        Self {
            owner,
            vector,
            dominant: vector.dominant(),
            sample_count: samples.len(),
            updated_at: Utc::now(),
        }
    }

    /// Returns true when both profiles carry the same aggregate
    pub fn same_aggregate(&self, other: &Profile) -> bool {
        self.owner == other.owner
            && self.sample_count == other.sample_count
            && self.dominant == other.dominant
            && self
                .vector
                .components()
                .iter()
                .zip(other.vector.components())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
