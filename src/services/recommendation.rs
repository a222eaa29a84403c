use std::sync::Arc;
use tracing::instrument;

use crate::{
    cached,
    db::{Cache, CacheKey, ProfileStore},
    error::{AppError, AppResult},
    models::{EmotionVector, OwnerRef, Profile, RankedMovie},
    services::AggregationEngine,
};

/// Ranks movie profiles against a query emotion vector
///
/// Pure: holds only limit policy and never touches storage.
#[derive(Debug, Clone, Copy)]
pub struct RecommendationEngine {
    default_limit: usize,
    max_limit: usize,
}

impl RecommendationEngine {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        Self {
            default_limit,
            max_limit: max_limit.max(default_limit),
        }
    }

    /// Applies the default to a missing limit and bounds an explicit one
    pub fn resolve_limit(&self, requested: Option<usize>) -> AppResult<usize> {
        match requested {
            None => Ok(self.default_limit),
            Some(0) => Err(AppError::InvalidInput(
                "limit must be at least 1".to_string(),
            )),
            Some(n) if n > self.max_limit => Err(AppError::InvalidInput(format!(
                "limit must not exceed {}",
                self.max_limit
            ))),
            Some(n) => Ok(n),
        }
    }

    /// Orders candidates by cosine similarity to the normalized query
    ///
    /// Both sides are normalized before comparison. Equal similarities are
    /// ordered by ascending movie id. At most `limit` movies are returned.
    pub fn rank(query: &EmotionVector, candidates: &[Profile], limit: usize) -> Vec<RankedMovie> {
        let query = query.normalize();

        let mut ranked: Vec<RankedMovie> = candidates
            .iter()
            .map(|profile| RankedMovie {
                movie_id: profile.owner.id,
                similarity: query.cosine_similarity(&profile.vector.normalize()),
                dominant_label: profile.dominant,
                dominant_ratio: profile.vector.get(profile.dominant),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });
        ranked.truncate(limit);
        ranked
    }
}

/// Serves recommendations over the stored movie profiles
#[derive(Clone)]
pub struct RecommendationService {
    profiles: Arc<dyn ProfileStore>,
    aggregation: AggregationEngine,
    engine: RecommendationEngine,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl RecommendationService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        aggregation: AggregationEngine,
        engine: RecommendationEngine,
        cache: Option<Cache>,
        cache_ttl: u64,
    ) -> Self {
        Self {
            profiles,
            aggregation,
            engine,
            cache,
            cache_ttl,
        }
    }

    /// Ranks every stored movie profile against `query`
    ///
    /// An empty catalog yields an empty list rather than an error.
    #[instrument(skip(self))]
    pub async fn recommend(
        &self,
        query: EmotionVector,
        limit: Option<usize>,
    ) -> AppResult<Vec<RankedMovie>> {
        let limit = self.engine.resolve_limit(limit)?;

        let ranked = match &self.cache {
            Some(cache) => {
                let key = CacheKey::Recommendation {
                    query: query.normalize(),
                    limit,
                };
                cached!(cache, key, self.cache_ttl, self.rank_stored(&query, limit))?
            }
            None => self.rank_stored(&query, limit).await?,
        };

        tracing::info!(
            limit,
            returned = ranked.len(),
            top_similarity = ranked.first().map(|r| r.similarity),
            "Recommendations ranked"
        );

        Ok(ranked)
    }

    /// Uses the member's own profile as the query vector
    pub async fn recommend_for_member(
        &self,
        member_id: i64,
        limit: Option<usize>,
    ) -> AppResult<Vec<RankedMovie>> {
        let profile = self
            .aggregation
            .get_profile(OwnerRef::member(member_id))
            .await?;
        self.recommend(profile.vector, limit).await
    }

    async fn rank_stored(&self, query: &EmotionVector, limit: usize) -> AppResult<Vec<RankedMovie>> {
        let candidates = self.profiles.movie_profiles().await?;
        Ok(RecommendationEngine::rank(query, &candidates, limit))
    }
}
