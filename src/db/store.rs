//! Storage collaborators consumed by the emotion engine
//!
//! The engine never talks to a database directly. It reads samples and like
//! relations through [`ReviewStore`] and persists aggregates through
//! [`ProfileStore`], so the same engine runs over PostgreSQL or memory.

use crate::{
    error::AppResult,
    models::{EmotionVector, Member, Movie, NewReview, OwnerKind, OwnerRef, Profile, Review},
};

/// Persisted per-owner aggregate profiles
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, owner: OwnerRef) -> AppResult<Option<Profile>>;

    /// Inserts the profile, or overwrites the owner's existing one
    async fn save_profile(&self, profile: &Profile) -> AppResult<()>;

    /// Every stored movie profile, ordered by movie id
    async fn movie_profiles(&self) -> AppResult<Vec<Profile>>;
}

/// Members, movies, reviews with their emotion samples, and likes
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReviewStore: Send + Sync {
    async fn owner_exists(&self, owner: OwnerRef) -> AppResult<bool>;

    /// Ids of every owner of one kind, ascending
    async fn owner_ids(&self, kind: OwnerKind) -> AppResult<Vec<i64>>;

    /// Current samples attributed to the owner, ordered by review id
    async fn samples_for(&self, owner: OwnerRef) -> AppResult<Vec<EmotionVector>>;

    /// Members with a like relation to the movie, ascending
    async fn likers_of(&self, movie_id: i64) -> AppResult<Vec<i64>>;

    async fn create_member(&self, username: &str) -> AppResult<Member>;

    async fn create_movie(&self, title: &str, release_year: Option<i32>) -> AppResult<Movie>;

    async fn insert_review(&self, review: NewReview) -> AppResult<Review>;

    async fn get_review(&self, review_id: i64) -> AppResult<Option<Review>>;

    /// Replaces the review's emotion sample (and content when given)
    async fn update_review(
        &self,
        review_id: i64,
        content: Option<String>,
        emotion: EmotionVector,
    ) -> AppResult<Option<Review>>;

    /// Deletes the review and its sample, returning what was removed
    async fn delete_review(&self, review_id: i64) -> AppResult<Option<Review>>;

    /// Returns false when the like already existed
    async fn add_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool>;

    /// Returns false when there was no like to remove
    async fn remove_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool>;
}
