pub mod emotion;
pub mod profile;
pub mod recommendation;
pub mod review;

pub use emotion::{EmotionLabel, EmotionScores, EmotionVector};
pub use profile::{OwnerKind, OwnerRef, Profile};
pub use recommendation::RankedMovie;
pub use review::{Member, Movie, NewReview, Review};
