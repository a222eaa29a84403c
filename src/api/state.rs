use std::sync::Arc;

use crate::{
    config::Config,
    db::{Cache, MemoryStore, ProfileStore, ReviewStore},
    services::{AggregationEngine, RecommendationEngine, RecommendationService, ReviewService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub aggregation: AggregationEngine,
    pub review_service: ReviewService,
    pub recommendations: RecommendationService,
}

impl AppState {
    /// Wires the services over the given stores
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        profiles: Arc<dyn ProfileStore>,
        cache: Option<Cache>,
        config: &Config,
    ) -> Self {
        let aggregation =
            AggregationEngine::new(reviews.clone(), profiles.clone(), config.liker_cascade);
        let review_service = ReviewService::new(reviews, aggregation.clone());
        let recommendations = RecommendationService::new(
            profiles,
            aggregation.clone(),
            RecommendationEngine::new(
                config.recommendation_limit,
                config.max_recommendation_limit,
            ),
            cache,
            config.recommendation_cache_ttl_secs,
        );

        Self {
            aggregation,
            review_service,
            recommendations,
        }
    }

    /// State over a fresh in-memory store with no cache
    pub fn in_memory(config: &Config) -> Self {
        let store = MemoryStore::new();
        Self::new(Arc::new(store.clone()), Arc::new(store), None, config)
    }
}
