use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{
        EmotionLabel, EmotionScores, EmotionVector, Member, Movie, OwnerKind, OwnerRef, Profile,
        RankedMovie, Review,
    },
    services::{CascadeReport, RebuildReport, RecomputeOutcome, ReviewChange},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub title: String,
    pub release_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub member_id: i64,
    pub movie_id: i64,
    #[serde(default)]
    pub content: String,
    pub emotion: EmotionScores,
}

#[derive(Debug, Deserialize)]
pub struct EditReviewRequest {
    pub content: Option<String>,
    pub emotion: EmotionScores,
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub member_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub emotion: EmotionScores,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub kind: OwnerKind,
    pub id: i64,
    pub emotion: EmotionVector,
    pub normalized: EmotionVector,
    pub dominant: EmotionLabel,
    pub sample_count: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Profile> for ProfileResponse {
    fn from(profile: &Profile) -> Self {
        Self {
            kind: profile.owner.kind,
            id: profile.owner.id,
            emotion: profile.vector,
            normalized: profile.vector.normalize(),
            dominant: profile.dominant,
            sample_count: profile.sample_count,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: Review,
    pub member_profile: ProfileResponse,
    pub movie_profile: ProfileResponse,
    pub cascade: CascadeReport,
}

impl From<ReviewChange> for ReviewResponse {
    fn from(change: ReviewChange) -> Self {
        Self {
            member_profile: ProfileResponse::from(&change.profiles.member),
            movie_profile: ProfileResponse::from(&change.profiles.movie),
            cascade: change.profiles.cascade,
            review: change.review,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub profile: ProfileResponse,
    pub cascade: CascadeReport,
}

impl From<RecomputeOutcome> for RecomputeResponse {
    fn from(outcome: RecomputeOutcome) -> Self {
        Self {
            profile: ProfileResponse::from(&outcome.profile),
            cascade: outcome.cascade,
        }
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn create_member(
    State(state): State<AppState>,
    Json(request): Json<CreateMemberRequest>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::InvalidInput("username must not be empty".to_string()));
    }

    let member = state.review_service.register_member(username).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn create_movie(
    State(state): State<AppState>,
    Json(request): Json<CreateMovieRequest>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("title must not be empty".to_string()));
    }

    let movie = state
        .review_service
        .register_movie(title, request.release_year)
        .await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

/// Submit a review; the author's and the movie's profiles are refreshed
pub async fn create_review(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let emotion = EmotionVector::try_from(request.emotion)?;

    tracing::info!(
        request_id = %request_id,
        member_id = request.member_id,
        movie_id = request.movie_id,
        "Creating review"
    );

    let change = state
        .review_service
        .on_review_created(request.member_id, request.movie_id, request.content, emotion)
        .await?;

    Ok((StatusCode::CREATED, Json(ReviewResponse::from(change))))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> AppResult<Json<Review>> {
    let review = state.review_service.get_review(review_id).await?;
    Ok(Json(review))
}

pub async fn edit_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
    Json(request): Json<EditReviewRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let emotion = EmotionVector::try_from(request.emotion)?;
    let change = state
        .review_service
        .on_review_edited(review_id, request.content, emotion)
        .await?;
    Ok(Json(ReviewResponse::from(change)))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
) -> AppResult<Json<ReviewResponse>> {
    let change = state.review_service.on_review_deleted(review_id).await?;
    Ok(Json(ReviewResponse::from(change)))
}

pub async fn like_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
    Json(request): Json<LikeRequest>,
) -> AppResult<StatusCode> {
    let created = state
        .review_service
        .like_movie(request.member_id, movie_id)
        .await?;
    Ok(if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

pub async fn unlike_movie(
    State(state): State<AppState>,
    Path((movie_id, member_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    state.review_service.unlike_movie(member_id, movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_member_profile(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state
        .aggregation
        .get_profile(OwnerRef::member(member_id))
        .await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

pub async fn get_movie_profile(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state
        .aggregation
        .get_profile(OwnerRef::movie(movie_id))
        .await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

/// Force a recompute from source; movie recomputes cascade to likers
pub async fn recompute_profile(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> AppResult<Json<RecomputeResponse>> {
    let kind = OwnerKind::parse(&kind)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown profile kind: {}", kind)))?;

    let outcome = state
        .aggregation
        .recompute_cascading(OwnerRef { kind, id })
        .await?;
    Ok(Json(RecomputeResponse::from(outcome)))
}

pub async fn rebuild_profiles(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<RebuildReport>> {
    tracing::info!(request_id = %request_id, "Rebuilding all profiles");
    let report = state.aggregation.rebuild_all().await?;
    Ok(Json(report))
}

/// Rank movies against a caller-supplied emotion vector
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendRequest>,
) -> AppResult<Json<Vec<RankedMovie>>> {
    let query = EmotionVector::try_from(request.emotion)?;

    tracing::info!(
        request_id = %request_id,
        dominant = %query.dominant(),
        limit = ?request.limit,
        "Processing recommendation request"
    );

    let ranked = state.recommendations.recommend(query, request.limit).await?;
    Ok(Json(ranked))
}

pub async fn recommend_for_member(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
    Query(params): Query<LimitQuery>,
) -> AppResult<Json<Vec<RankedMovie>>> {
    let ranked = state
        .recommendations
        .recommend_for_member(member_id, params.limit)
        .await?;
    Ok(Json(ranked))
}
