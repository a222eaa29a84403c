use serde::{Deserialize, Serialize};

use super::EmotionLabel;

/// One ranked movie in a recommendation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMovie {
    pub movie_id: i64,
    /// Cosine similarity between the normalized query and movie vectors
    pub similarity: f64,
    pub dominant_label: EmotionLabel,
    /// The movie's un-normalized component for its own dominant label
    pub dominant_ratio: f64,
}
