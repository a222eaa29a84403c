use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::{
    db::{ProfileStore, ReviewStore},
    error::{AppError, AppResult},
    models::{OwnerKind, OwnerRef, Profile},
};

/// Attempts per dependent recompute during a cascade
const CASCADE_ATTEMPTS: usize = 2;

/// Registry of per-owner async mutexes
///
/// Entries are created on demand and dropped again once no task holds or
/// waits on them.
#[derive(Default)]
struct OwnerLocks {
    locks: Mutex<HashMap<OwnerRef, Arc<tokio::sync::Mutex<()>>>>,
}

struct OwnerGuard<'a> {
    registry: &'a OwnerLocks,
    owner: OwnerRef,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OwnerLocks {
    async fn acquire(&self, owner: OwnerRef) -> OwnerGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(owner).or_default().clone()
        };

        OwnerGuard {
            registry: self,
            owner,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .registry
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // only the registry itself still references the mutex
        if locks
            .get(&self.owner)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.owner);
        }
    }
}

/// A dependent member whose recompute failed during a cascade
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CascadeFailure {
    pub member_id: i64,
    pub error: String,
}

/// Outcome of propagating a movie recompute to its likers
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CascadeReport {
    pub recomputed: Vec<i64>,
    pub failed: Vec<CascadeFailure>,
}

/// Profiles touched by one review change
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRecompute {
    pub member: Profile,
    pub movie: Profile,
    pub cascade: CascadeReport,
}

/// Profile (plus cascade, for movies) from an explicit recompute request
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub profile: Profile,
    pub cascade: CascadeReport,
}

/// Result of recomputing every profile from source
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub members: usize,
    pub movies: usize,
    pub failed: Vec<RebuildFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildFailure {
    pub owner: OwnerRef,
    pub error: String,
}

/// Derives member and movie emotion profiles from raw review samples
///
/// Every recompute re-reads the owner's full sample set and stores its mean,
/// so the result depends only on the current samples and never on the order
/// or number of earlier recomputes. Recomputes of the same owner are
/// serialized; different owners proceed in parallel.
#[derive(Clone)]
pub struct AggregationEngine {
    reviews: Arc<dyn ReviewStore>,
    profiles: Arc<dyn ProfileStore>,
    locks: Arc<OwnerLocks>,
    liker_cascade: bool,
}

impl AggregationEngine {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        profiles: Arc<dyn ProfileStore>,
        liker_cascade: bool,
    ) -> Self {
        Self {
            reviews,
            profiles,
            locks: Arc::new(OwnerLocks::default()),
            liker_cascade,
        }
    }

    /// Recomputes and persists one owner's profile from all of its samples
    ///
    /// Fails with `NotFound` for an unknown owner and `AggregationFailure`
    /// when samples cannot be read. Nothing is written on failure.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn recompute(&self, owner: OwnerRef) -> AppResult<Profile> {
        let _guard = self.locks.acquire(owner).await;
        self.recompute_locked(owner).await
    }

    async fn recompute_locked(&self, owner: OwnerRef) -> AppResult<Profile> {
        if !self.reviews.owner_exists(owner).await? {
            return Err(not_found(owner));
        }

        let samples = self.reviews.samples_for(owner).await.map_err(|e| {
            tracing::error!(owner = %owner, error = %e, "Sample read failed, keeping previous profile");
            AppError::AggregationFailure(format!("failed to read samples for {}: {}", owner, e))
        })?;

        let profile = Profile::from_samples(owner, &samples);
        self.profiles.save_profile(&profile).await?;

        tracing::debug!(
            owner = %owner,
            sample_count = profile.sample_count,
            dominant = %profile.dominant,
            "Profile recomputed"
        );

        Ok(profile)
    }

    /// Recomputes the owner and, for a movie, cascades to its likers
    pub async fn recompute_cascading(&self, owner: OwnerRef) -> AppResult<RecomputeOutcome> {
        let profile = self.recompute(owner).await?;
        let cascade = match owner.kind {
            OwnerKind::Movie => self.cascade_movie(owner.id).await?,
            OwnerKind::Member => CascadeReport::default(),
        };
        Ok(RecomputeOutcome { profile, cascade })
    }

    /// Brings every profile that depends on a review's sample up to date
    ///
    /// The author and the reviewed movie are recomputed directly; the movie
    /// recompute then cascades to the movie's likers.
    #[instrument(skip(self))]
    pub async fn apply_review_change(
        &self,
        member_id: i64,
        movie_id: i64,
    ) -> AppResult<ReviewRecompute> {
        let member = self.recompute(OwnerRef::member(member_id)).await?;
        let movie = self.recompute(OwnerRef::movie(movie_id)).await?;
        let cascade = self.cascade_to_likers(movie_id, Some(member_id)).await?;

        Ok(ReviewRecompute {
            member,
            movie,
            cascade,
        })
    }

    /// Re-runs recompute for each member who likes the movie
    pub async fn cascade_movie(&self, movie_id: i64) -> AppResult<CascadeReport> {
        self.cascade_to_likers(movie_id, None).await
    }

    /// Each liker is an independent recompute; one failing never stops the rest
    async fn cascade_to_likers(
        &self,
        movie_id: i64,
        skip_member: Option<i64>,
    ) -> AppResult<CascadeReport> {
        if !self.liker_cascade {
            return Ok(CascadeReport::default());
        }

        let likers: Vec<i64> = self
            .reviews
            .likers_of(movie_id)
            .await?
            .into_iter()
            .filter(|id| Some(*id) != skip_member)
            .collect();

        if likers.is_empty() {
            return Ok(CascadeReport::default());
        }

        let tasks: Vec<(i64, JoinHandle<AppResult<Profile>>)> = likers
            .into_iter()
            .map(|member_id| {
                let engine = self.clone();
                let task = tokio::spawn(async move {
                    engine.recompute_with_retry(OwnerRef::member(member_id)).await
                });
                (member_id, task)
            })
            .collect();

        let mut report = CascadeReport::default();
        for (member_id, task) in tasks {
            let error = match task.await {
                Ok(Ok(_)) => {
                    report.recomputed.push(member_id);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                // a panicked recompute is still a failed liker
                Err(e) => e.to_string(),
            };

            tracing::error!(
                movie_id,
                member_id,
                error = %error,
                "Cascade recompute failed for liker"
            );
            report.failed.push(CascadeFailure { member_id, error });
        }

        if !report.failed.is_empty() {
            tracing::warn!(
                movie_id,
                success_count = report.recomputed.len(),
                error_count = report.failed.len(),
                "Partial cascade failure"
            );
        }

        Ok(report)
    }

    async fn recompute_with_retry(&self, owner: OwnerRef) -> AppResult<Profile> {
        let mut attempt = 1;
        loop {
            match self.recompute(owner).await {
                Ok(profile) => return Ok(profile),
                Err(e @ AppError::NotFound(_)) => return Err(e),
                Err(e) if attempt >= CASCADE_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::warn!(owner = %owner, attempt, error = %e, "Retrying recompute");
                    attempt += 1;
                }
            }
        }
    }

    /// Returns the stored profile, computing it on first request
    pub async fn get_profile(&self, owner: OwnerRef) -> AppResult<Profile> {
        if !self.reviews.owner_exists(owner).await? {
            return Err(not_found(owner));
        }

        if let Some(profile) = self.profiles.get_profile(owner).await? {
            return Ok(profile);
        }

        self.recompute(owner).await
    }

    /// Recomputes every member and movie profile from source
    #[instrument(skip(self))]
    pub async fn rebuild_all(&self) -> AppResult<RebuildReport> {
        let mut report = RebuildReport::default();

        for kind in [OwnerKind::Movie, OwnerKind::Member] {
            for id in self.reviews.owner_ids(kind).await? {
                let owner = OwnerRef { kind, id };
                match self.recompute(owner).await {
                    Ok(_) => match kind {
                        OwnerKind::Member => report.members += 1,
                        OwnerKind::Movie => report.movies += 1,
                    },
                    Err(e) => {
                        tracing::error!(owner = %owner, error = %e, "Rebuild recompute failed");
                        report.failed.push(RebuildFailure {
                            owner,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            members = report.members,
            movies = report.movies,
            failed = report.failed.len(),
            "Profile rebuild completed"
        );

        Ok(report)
    }
}

fn not_found(owner: OwnerRef) -> AppError {
    AppError::NotFound(format!("{} {} does not exist", owner.kind.as_str(), owner.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, MockReviewStore};
    use crate::models::{EmotionLabel, EmotionVector, NewReview};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn v(c: [f64; 5]) -> EmotionVector {
        EmotionVector::from_components(c)
    }

    fn engine_over(store: &MemoryStore, liker_cascade: bool) -> AggregationEngine {
        AggregationEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            liker_cascade,
        )
    }

    async fn review(store: &MemoryStore, member_id: i64, movie_id: i64, e: [f64; 5]) -> i64 {
        store
            .insert_review(NewReview {
                member_id,
                movie_id,
                content: String::new(),
                emotion: v(e),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_recompute_is_mean_with_declared_tie_break() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Amelie", None).await.unwrap();
        review(&store, member.id, movie.id, [1.0, 0.0, 0.0, 0.0, 0.0]).await;
        review(&store, member.id, movie.id, [0.0, 1.0, 0.0, 0.0, 0.0]).await;

        let engine = engine_over(&store, true);
        let profile = engine.recompute(OwnerRef::member(member.id)).await.unwrap();

        assert_eq!(profile.vector, v([0.5, 0.5, 0.0, 0.0, 0.0]));
        assert_eq!(profile.dominant, EmotionLabel::Joy);
        assert_eq!(profile.sample_count, 2);

        let stored = store.get_profile(OwnerRef::member(member.id)).await.unwrap();
        assert_eq!(stored, Some(profile));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Alien", Some(1979)).await.unwrap();
        review(&store, member.id, movie.id, [0.1, 0.3, 0.2, 0.9, 0.4]).await;
        review(&store, member.id, movie.id, [0.7, 0.1, 0.0, 0.3, 0.05]).await;
        review(&store, member.id, movie.id, [0.33, 0.0, 0.6, 0.2, 0.1]).await;

        let engine = engine_over(&store, true);
        let first = engine.recompute(OwnerRef::movie(movie.id)).await.unwrap();
        let second = engine.recompute(OwnerRef::movie(movie.id)).await.unwrap();

        assert!(first.same_aggregate(&second));
    }

    #[tokio::test]
    async fn test_recompute_is_not_path_dependent() {
        let samples = [
            [0.2, 0.4, 0.0, 0.1, 0.0],
            [0.9, 0.0, 0.3, 0.0, 0.2],
            [0.0, 0.6, 0.6, 0.4, 0.8],
        ];

        // recompute after every review
        let incremental = MemoryStore::new();
        let member = incremental.create_member("ana").await.unwrap();
        let movie = incremental.create_movie("Up", None).await.unwrap();
        let engine = engine_over(&incremental, true);
        let mut last = None;
        for s in samples {
            review(&incremental, member.id, movie.id, s).await;
            last = Some(engine.recompute(OwnerRef::member(member.id)).await.unwrap());
        }

        // recompute once over the full set
        let bulk = MemoryStore::new();
        let member = bulk.create_member("ana").await.unwrap();
        let movie = bulk.create_movie("Up", None).await.unwrap();
        for s in samples {
            review(&bulk, member.id, movie.id, s).await;
        }
        let rebuilt = engine_over(&bulk, true)
            .recompute(OwnerRef::member(member.id))
            .await
            .unwrap();

        let expected = EmotionVector::mean(&samples.map(v));
        assert_eq!(rebuilt.vector, expected);
        assert!(last.unwrap().same_aggregate(&rebuilt));
    }

    #[tokio::test]
    async fn test_deleting_only_review_yields_zero_profile() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Jaws", None).await.unwrap();
        let review_id = review(&store, member.id, movie.id, [0.0, 0.0, 0.0, 1.0, 0.0]).await;

        let engine = engine_over(&store, true);
        let before = engine.recompute(OwnerRef::member(member.id)).await.unwrap();
        assert_eq!(before.dominant, EmotionLabel::Fear);

        store.delete_review(review_id).await.unwrap();
        let after = engine.recompute(OwnerRef::member(member.id)).await.unwrap();

        assert_eq!(after.vector, EmotionVector::zero());
        assert_eq!(after.dominant, EmotionLabel::None);
        assert_eq!(after.sample_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_owner_is_not_found_and_writes_nothing() {
        let store = MemoryStore::new();
        let engine = engine_over(&store, true);

        let err = engine.recompute(OwnerRef::movie(404)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get_profile(OwnerRef::movie(404)).await.unwrap().is_none());

        let err = engine.get_profile(OwnerRef::member(404)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sample_failure_keeps_previous_profile() {
        let profiles = MemoryStore::new();
        let owner = OwnerRef::movie(5);
        let previous = Profile::from_samples(owner, &[v([0.0, 0.0, 1.0, 0.0, 0.0])]);
        profiles.save_profile(&previous).await.unwrap();

        let mut reviews = MockReviewStore::new();
        reviews.expect_owner_exists().returning(|_| Ok(true));
        reviews
            .expect_samples_for()
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let engine = AggregationEngine::new(Arc::new(reviews), Arc::new(profiles.clone()), true);
        let err = engine.recompute(owner).await.unwrap_err();

        assert!(matches!(err, AppError::AggregationFailure(_)));
        assert_eq!(profiles.get_profile(owner).await.unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn test_get_profile_is_lazy() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let engine = engine_over(&store, true);

        assert!(store
            .get_profile(OwnerRef::member(member.id))
            .await
            .unwrap()
            .is_none());

        let profile = engine.get_profile(OwnerRef::member(member.id)).await.unwrap();
        assert_eq!(profile.dominant, EmotionLabel::None);
        assert!(store
            .get_profile(OwnerRef::member(member.id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_review_change_recomputes_author_movie_and_likers() {
        let store = MemoryStore::new();
        let author = store.create_member("ana").await.unwrap();
        let fan = store.create_member("ben").await.unwrap();
        let movie = store.create_movie("Coco", None).await.unwrap();
        store.add_like(fan.id, movie.id).await.unwrap();
        store.add_like(author.id, movie.id).await.unwrap();
        review(&store, author.id, movie.id, [0.8, 0.6, 0.0, 0.0, 0.0]).await;

        let engine = engine_over(&store, true);
        let outcome = engine.apply_review_change(author.id, movie.id).await.unwrap();

        assert_eq!(outcome.member.dominant, EmotionLabel::Joy);
        assert_eq!(outcome.movie.vector, v([0.8, 0.6, 0.0, 0.0, 0.0]));
        // the author was already recomputed directly
        assert_eq!(outcome.cascade.recomputed, vec![fan.id]);
        assert!(outcome.cascade.failed.is_empty());

        // member aggregates stay defined over authored reviews only
        let fan_profile = store.get_profile(OwnerRef::member(fan.id)).await.unwrap().unwrap();
        assert_eq!(fan_profile.vector, EmotionVector::zero());
    }

    #[tokio::test]
    async fn test_cascade_disabled() {
        let store = MemoryStore::new();
        let fan = store.create_member("ben").await.unwrap();
        let movie = store.create_movie("Coco", None).await.unwrap();
        store.add_like(fan.id, movie.id).await.unwrap();

        let engine = engine_over(&store, false);
        let outcome = engine
            .recompute_cascading(OwnerRef::movie(movie.id))
            .await
            .unwrap();

        assert!(outcome.cascade.recomputed.is_empty());
        assert!(store.get_profile(OwnerRef::member(fan.id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cascade_failure_does_not_stop_other_likers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let mut reviews = MockReviewStore::new();
        reviews.expect_owner_exists().returning(|_| Ok(true));
        reviews.expect_likers_of().returning(|_| Ok(vec![1, 2, 3]));
        reviews.expect_samples_for().returning(move |owner| {
            if owner == OwnerRef::member(2) {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Internal("disk on fire".to_string()))
            } else {
                Ok(vec![v([0.1, 0.0, 0.0, 0.0, 0.0])])
            }
        });

        let profiles = MemoryStore::new();
        let engine = AggregationEngine::new(Arc::new(reviews), Arc::new(profiles.clone()), true);
        let outcome = engine.recompute_cascading(OwnerRef::movie(10)).await.unwrap();

        assert_eq!(outcome.cascade.recomputed, vec![1, 3]);
        assert_eq!(outcome.cascade.failed.len(), 1);
        assert_eq!(outcome.cascade.failed[0].member_id, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), CASCADE_ATTEMPTS);
        assert!(profiles.get_profile(OwnerRef::member(3)).await.unwrap().is_some());
        assert!(profiles.get_profile(OwnerRef::member(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_all() {
        let store = MemoryStore::new();
        let a = store.create_member("ana").await.unwrap();
        let b = store.create_member("ben").await.unwrap();
        let movie = store.create_movie("Heat", None).await.unwrap();
        review(&store, a.id, movie.id, [0.0, 0.0, 1.0, 0.0, 0.0]).await;
        review(&store, b.id, movie.id, [0.0, 0.0, 0.0, 0.0, 1.0]).await;

        let report = engine_over(&store, true).rebuild_all().await.unwrap();
        assert_eq!(report.members, 2);
        assert_eq!(report.movies, 1);
        assert!(report.failed.is_empty());

        let movie_profile = store.get_profile(OwnerRef::movie(movie.id)).await.unwrap().unwrap();
        assert_eq!(movie_profile.vector, v([0.0, 0.0, 0.5, 0.0, 0.5]));
        assert_eq!(movie_profile.dominant, EmotionLabel::Anger);
    }

    #[tokio::test]
    async fn test_cascade_movie_recomputes_every_liker() {
        let store = MemoryStore::new();
        let a = store.create_member("ana").await.unwrap();
        let b = store.create_member("ben").await.unwrap();
        let movie = store.create_movie("Coco", None).await.unwrap();
        store.add_like(b.id, movie.id).await.unwrap();
        store.add_like(a.id, movie.id).await.unwrap();

        let report = engine_over(&store, true).cascade_movie(movie.id).await.unwrap();

        assert_eq!(report.recomputed, vec![a.id, b.id]);
        assert!(report.failed.is_empty());
        for id in [a.id, b.id] {
            assert!(store.get_profile(OwnerRef::member(id)).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_panicked_cascade_task_is_reported_as_failure() {
        let (store, ids) = store_with_members(3).await;
        let movie = store.create_movie("Coco", None).await.unwrap();
        for id in &ids {
            store.add_like(*id, movie.id).await.unwrap();
        }

        let mut crashing = InstrumentedStore::new(store.clone());
        crashing.panic_for = Some(OwnerRef::member(ids[1]));
        let engine = AggregationEngine::new(Arc::new(crashing), Arc::new(store.clone()), true);

        let report = engine.cascade_movie(movie.id).await.unwrap();

        assert_eq!(report.recomputed, vec![ids[0], ids[2]]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].member_id, ids[1]);
        assert!(report.failed[0].error.contains("panic"));
        // the crashed task released its owner lock while unwinding
        assert_eq!(engine.locks.len(), 0);
    }

    /// Review store that records how many sample reads overlap
    ///
    /// Reading samples for `panic_for` panics, standing in for a crashed task.
    struct InstrumentedStore {
        inner: MemoryStore,
        active: AtomicUsize,
        max_active: AtomicUsize,
        panic_for: Option<OwnerRef>,
    }

    impl InstrumentedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                panic_for: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl ReviewStore for InstrumentedStore {
        async fn owner_exists(&self, owner: OwnerRef) -> AppResult<bool> {
            self.inner.owner_exists(owner).await
        }
        async fn owner_ids(&self, kind: OwnerKind) -> AppResult<Vec<i64>> {
            self.inner.owner_ids(kind).await
        }
        async fn samples_for(&self, owner: OwnerRef) -> AppResult<Vec<EmotionVector>> {
            if self.panic_for == Some(owner) {
                panic!("sample read crashed for {}", owner);
            }
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let samples = self.inner.samples_for(owner).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            samples
        }
        async fn likers_of(&self, movie_id: i64) -> AppResult<Vec<i64>> {
            self.inner.likers_of(movie_id).await
        }
        async fn create_member(&self, username: &str) -> AppResult<crate::models::Member> {
            self.inner.create_member(username).await
        }
        async fn create_movie(
            &self,
            title: &str,
            release_year: Option<i32>,
        ) -> AppResult<crate::models::Movie> {
            self.inner.create_movie(title, release_year).await
        }
        async fn insert_review(&self, review: NewReview) -> AppResult<crate::models::Review> {
            self.inner.insert_review(review).await
        }
        async fn get_review(&self, review_id: i64) -> AppResult<Option<crate::models::Review>> {
            self.inner.get_review(review_id).await
        }
        async fn update_review(
            &self,
            review_id: i64,
            content: Option<String>,
            emotion: EmotionVector,
        ) -> AppResult<Option<crate::models::Review>> {
            self.inner.update_review(review_id, content, emotion).await
        }
        async fn delete_review(&self, review_id: i64) -> AppResult<Option<crate::models::Review>> {
            self.inner.delete_review(review_id).await
        }
        async fn add_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
            self.inner.add_like(member_id, movie_id).await
        }
        async fn remove_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
            self.inner.remove_like(member_id, movie_id).await
        }
    }

    async fn store_with_members(n: usize) -> (MemoryStore, Vec<i64>) {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..n {
            ids.push(store.create_member(&format!("m{}", i)).await.unwrap().id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn test_same_owner_recomputes_are_serialized() {
        let (store, ids) = store_with_members(1).await;
        let counting = Arc::new(InstrumentedStore::new(store.clone()));
        let engine = AggregationEngine::new(counting.clone(), Arc::new(store), true);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let owner = OwnerRef::member(ids[0]);
                tokio::spawn(async move { engine.recompute(owner).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(counting.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(engine.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_owners_recompute_in_parallel() {
        let (store, ids) = store_with_members(4).await;
        let counting = Arc::new(InstrumentedStore::new(store.clone()));
        let engine = AggregationEngine::new(counting.clone(), Arc::new(store), true);

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let engine = engine.clone();
                let owner = OwnerRef::member(*id);
                tokio::spawn(async move { engine.recompute(owner).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(counting.max_active.load(Ordering::SeqCst) > 1);
    }
}
