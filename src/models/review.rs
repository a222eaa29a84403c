use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmotionVector;

/// A registered platform member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A movie that can be reviewed and liked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub release_year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// A member's review of a movie together with its emotion sample
///
/// The sample lives and dies with the review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: i64,
    pub member_id: i64,
    pub movie_id: i64,
    pub content: String,
    pub emotion: EmotionVector,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to write a new review
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub member_id: i64,
    pub movie_id: i64,
    pub content: String,
    pub emotion: EmotionVector,
}
