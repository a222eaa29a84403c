use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    db::{ProfileStore, ReviewStore},
    error::{AppError, AppResult},
    models::{EmotionVector, Member, Movie, NewReview, OwnerKind, OwnerRef, Profile, Review},
};

/// In-process store backing both storage traits
///
/// Ordered maps keep sample and id listings in ascending id order, matching
/// what the PostgreSQL queries return.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    members: BTreeMap<i64, Member>,
    movies: BTreeMap<i64, Movie>,
    reviews: BTreeMap<i64, Review>,
    likes: BTreeSet<(i64, i64)>,
    profiles: HashMap<OwnerRef, Profile>,
    next_id: i64,
}

impl MemoryStoreInner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, owner: OwnerRef) -> AppResult<Option<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.get(&owner).cloned())
    }

    async fn save_profile(&self, profile: &Profile) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(profile.owner, profile.clone());
        Ok(())
    }

    async fn movie_profiles(&self) -> AppResult<Vec<Profile>> {
        let inner = self.inner.read().await;
        let mut profiles: Vec<Profile> = inner
            .profiles
            .values()
            .filter(|p| p.owner.kind == OwnerKind::Movie)
            .cloned()
            .collect();
        profiles.sort_by_key(|p| p.owner.id);
        Ok(profiles)
    }
}

#[async_trait::async_trait]
impl ReviewStore for MemoryStore {
    async fn owner_exists(&self, owner: OwnerRef) -> AppResult<bool> {
        let inner = self.inner.read().await;
        Ok(match owner.kind {
            OwnerKind::Member => inner.members.contains_key(&owner.id),
            OwnerKind::Movie => inner.movies.contains_key(&owner.id),
        })
    }

    async fn owner_ids(&self, kind: OwnerKind) -> AppResult<Vec<i64>> {
        let inner = self.inner.read().await;
        Ok(match kind {
            OwnerKind::Member => inner.members.keys().copied().collect(),
            OwnerKind::Movie => inner.movies.keys().copied().collect(),
        })
    }

    async fn samples_for(&self, owner: OwnerRef) -> AppResult<Vec<EmotionVector>> {
        let inner = self.inner.read().await;
        let samples = inner
            .reviews
            .values()
            .filter(|r| match owner.kind {
                OwnerKind::Member => r.member_id == owner.id,
                OwnerKind::Movie => r.movie_id == owner.id,
            })
            .map(|r| r.emotion)
            .collect();
        Ok(samples)
    }

    async fn likers_of(&self, movie_id: i64) -> AppResult<Vec<i64>> {
        let inner = self.inner.read().await;
        // (member, movie) ordering yields members ascending
        Ok(inner
            .likes
            .iter()
            .filter(|(_, movie)| *movie == movie_id)
            .map(|(member, _)| *member)
            .collect())
    }

    async fn create_member(&self, username: &str) -> AppResult<Member> {
        let mut inner = self.inner.write().await;
        if inner.members.values().any(|m| m.username == username) {
            return Err(AppError::Conflict(format!(
                "username {} is already taken",
                username
            )));
        }
        let member = Member {
            id: inner.allocate_id(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        inner.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn create_movie(&self, title: &str, release_year: Option<i32>) -> AppResult<Movie> {
        let mut inner = self.inner.write().await;
        let movie = Movie {
            id: inner.allocate_id(),
            title: title.to_string(),
            release_year,
            created_at: Utc::now(),
        };
        inner.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn insert_review(&self, review: NewReview) -> AppResult<Review> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let review = Review {
            id: inner.allocate_id(),
            member_id: review.member_id,
            movie_id: review.movie_id,
            content: review.content,
            emotion: review.emotion,
            created_at: now,
            updated_at: now,
        };
        inner.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: i64) -> AppResult<Option<Review>> {
        let inner = self.inner.read().await;
        Ok(inner.reviews.get(&review_id).cloned())
    }

    async fn update_review(
        &self,
        review_id: i64,
        content: Option<String>,
        emotion: EmotionVector,
    ) -> AppResult<Option<Review>> {
        let mut inner = self.inner.write().await;
        let Some(review) = inner.reviews.get_mut(&review_id) else {
            return Ok(None);
        };
        if let Some(content) = content {
            review.content = content;
        }
        review.emotion = emotion;
        review.updated_at = Utc::now();
        Ok(Some(review.clone()))
    }

    async fn delete_review(&self, review_id: i64) -> AppResult<Option<Review>> {
        let mut inner = self.inner.write().await;
        Ok(inner.reviews.remove(&review_id))
    }

    async fn add_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.likes.insert((member_id, movie_id)))
    }

    async fn remove_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.likes.remove(&(member_id, movie_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(joy: f64) -> EmotionVector {
        EmotionVector::from_components([joy, 0.0, 0.0, 0.0, 0.0])
    }

    #[tokio::test]
    async fn test_samples_follow_review_order() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Heat", Some(1995)).await.unwrap();

        for joy in [0.1, 0.2, 0.3] {
            store
                .insert_review(NewReview {
                    member_id: member.id,
                    movie_id: movie.id,
                    content: String::new(),
                    emotion: sample(joy),
                })
                .await
                .unwrap();
        }

        let samples = store.samples_for(OwnerRef::movie(movie.id)).await.unwrap();
        let joys: Vec<f64> = samples.iter().map(|s| s.joy).collect();
        assert_eq!(joys, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_delete_review_removes_sample() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Heat", None).await.unwrap();
        let review = store
            .insert_review(NewReview {
                member_id: member.id,
                movie_id: movie.id,
                content: "tense".to_string(),
                emotion: sample(0.4),
            })
            .await
            .unwrap();

        let deleted = store.delete_review(review.id).await.unwrap();
        assert_eq!(deleted.map(|r| r.id), Some(review.id));
        assert!(store
            .samples_for(OwnerRef::member(member.id))
            .await
            .unwrap()
            .is_empty());
        assert!(store.delete_review(review.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store.create_member("ana").await.unwrap();

        let err = store.create_member("ana").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.owner_ids(OwnerKind::Member).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_review() {
        let store = MemoryStore::new();
        let member = store.create_member("ana").await.unwrap();
        let movie = store.create_movie("Heat", None).await.unwrap();
        let review = store
            .insert_review(NewReview {
                member_id: member.id,
                movie_id: movie.id,
                content: "tense".to_string(),
                emotion: sample(0.4),
            })
            .await
            .unwrap();

        assert_eq!(store.get_review(review.id).await.unwrap(), Some(review));
        assert!(store.get_review(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_likes_are_a_set() {
        let store = MemoryStore::new();
        assert!(store.add_like(1, 10).await.unwrap());
        assert!(!store.add_like(1, 10).await.unwrap());
        assert!(store.add_like(3, 10).await.unwrap());
        assert!(store.add_like(2, 11).await.unwrap());

        assert_eq!(store.likers_of(10).await.unwrap(), vec![1, 3]);
        assert!(store.remove_like(1, 10).await.unwrap());
        assert!(!store.remove_like(1, 10).await.unwrap());
        assert_eq!(store.likers_of(10).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_movie_profiles_only_movies() {
        let store = MemoryStore::new();
        for owner in [OwnerRef::movie(9), OwnerRef::member(1), OwnerRef::movie(2)] {
            store
                .save_profile(&Profile::from_samples(owner, &[sample(0.5)]))
                .await
                .unwrap();
        }

        let ids: Vec<i64> = store
            .movie_profiles()
            .await
            .unwrap()
            .iter()
            .map(|p| p.owner.id)
            .collect();
        assert_eq!(ids, vec![2, 9]);
    }
}
