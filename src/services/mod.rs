pub mod aggregation;
pub mod recommendation;
pub mod reviews;

pub use aggregation::{AggregationEngine, CascadeReport, RebuildReport, RecomputeOutcome};
pub use recommendation::{RecommendationEngine, RecommendationService};
pub use reviews::{ReviewChange, ReviewService};
