use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::ReviewStore,
    error::{AppError, AppResult},
    models::{EmotionVector, Member, Movie, NewReview, OwnerRef, Review},
    services::aggregation::{AggregationEngine, ReviewRecompute},
};

/// A persisted review change and the profiles it refreshed
#[derive(Debug, Clone, Serialize)]
pub struct ReviewChange {
    pub review: Review,
    pub profiles: ReviewRecompute,
}

/// Reacts to review and like lifecycle events
///
/// Each event is persisted first; the affected profiles are then recomputed
/// before the call returns, so no caller observes a profile older than the
/// event it just completed.
#[derive(Clone)]
pub struct ReviewService {
    reviews: Arc<dyn ReviewStore>,
    aggregation: AggregationEngine,
}

impl ReviewService {
    pub fn new(reviews: Arc<dyn ReviewStore>, aggregation: AggregationEngine) -> Self {
        Self {
            reviews,
            aggregation,
        }
    }

    async fn require(&self, owner: OwnerRef) -> AppResult<()> {
        if self.reviews.owner_exists(owner).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "{} {} does not exist",
                owner.kind.as_str(),
                owner.id
            )))
        }
    }

    /// Registers a member along with its empty profile
    pub async fn register_member(&self, username: &str) -> AppResult<Member> {
        let member = self.reviews.create_member(username).await?;
        self.aggregation.recompute(OwnerRef::member(member.id)).await?;
        tracing::info!(member_id = member.id, "Member registered");
        Ok(member)
    }

    /// Registers a movie along with its empty profile
    ///
    /// The zero profile makes the movie a ranking candidate immediately, so
    /// recommendation results never depend on whether its profile was read.
    pub async fn register_movie(&self, title: &str, release_year: Option<i32>) -> AppResult<Movie> {
        let movie = self.reviews.create_movie(title, release_year).await?;
        self.aggregation.recompute(OwnerRef::movie(movie.id)).await?;
        tracing::info!(movie_id = movie.id, "Movie registered");
        Ok(movie)
    }

    pub async fn get_review(&self, review_id: i64) -> AppResult<Review> {
        self.reviews
            .get_review(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review {} does not exist", review_id)))
    }

    #[instrument(skip(self, content, emotion))]
    pub async fn on_review_created(
        &self,
        member_id: i64,
        movie_id: i64,
        content: String,
        emotion: EmotionVector,
    ) -> AppResult<ReviewChange> {
        self.require(OwnerRef::member(member_id)).await?;
        self.require(OwnerRef::movie(movie_id)).await?;

        let review = self
            .reviews
            .insert_review(NewReview {
                member_id,
                movie_id,
                content,
                emotion,
            })
            .await?;

        tracing::info!(review_id = review.id, "Review created");

        let profiles = self
            .aggregation
            .apply_review_change(review.member_id, review.movie_id)
            .await?;

        Ok(ReviewChange { review, profiles })
    }

    #[instrument(skip(self, content, emotion))]
    pub async fn on_review_edited(
        &self,
        review_id: i64,
        content: Option<String>,
        emotion: EmotionVector,
    ) -> AppResult<ReviewChange> {
        let review = self
            .reviews
            .update_review(review_id, content, emotion)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review {} does not exist", review_id)))?;

        tracing::info!(review_id, "Review edited");

        let profiles = self
            .aggregation
            .apply_review_change(review.member_id, review.movie_id)
            .await?;

        Ok(ReviewChange { review, profiles })
    }

    #[instrument(skip(self))]
    pub async fn on_review_deleted(&self, review_id: i64) -> AppResult<ReviewChange> {
        let review = self
            .reviews
            .delete_review(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review {} does not exist", review_id)))?;

        tracing::info!(review_id, "Review deleted");

        let profiles = self
            .aggregation
            .apply_review_change(review.member_id, review.movie_id)
            .await?;

        Ok(ReviewChange { review, profiles })
    }

    /// Records a like; liked movies do not feed the member's own aggregate
    pub async fn like_movie(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
        self.require(OwnerRef::member(member_id)).await?;
        self.require(OwnerRef::movie(movie_id)).await?;

        let created = self.reviews.add_like(member_id, movie_id).await?;
        tracing::debug!(member_id, movie_id, created, "Like recorded");
        Ok(created)
    }

    pub async fn unlike_movie(&self, member_id: i64, movie_id: i64) -> AppResult<()> {
        if !self.reviews.remove_like(member_id, movie_id).await? {
            return Err(AppError::NotFound(format!(
                "member {} does not like movie {}",
                member_id, movie_id
            )));
        }
        Ok(())
    }
}
