use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{ProfileStore, ReviewStore},
    error::{AppError, AppResult},
    models::{
        EmotionLabel, EmotionVector, Member, Movie, NewReview, OwnerKind, OwnerRef, Profile,
        Review,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const REVIEW_COLUMNS: &str = r#"
    r.id, r.member_id, r.movie_id, r.content, r.created_at, r.updated_at,
    e.joy, e.sadness, e.anger, e.fear, e.disgust
"#;

#[derive(Debug, sqlx::FromRow)]
struct EmotionRow {
    joy: f64,
    sadness: f64,
    anger: f64,
    fear: f64,
    disgust: f64,
}

impl EmotionRow {
    fn into_vector(self) -> AppResult<EmotionVector> {
        EmotionVector::try_from_components([
            self.joy,
            self.sadness,
            self.anger,
            self.fear,
            self.disgust,
        ])
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    member_id: i64,
    movie_id: i64,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(flatten)]
    emotion: EmotionRow,
}

impl TryFrom<ReviewRow> for Review {
    type Error = AppError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Review {
            id: row.id,
            member_id: row.member_id,
            movie_id: row.movie_id,
            content: row.content,
            emotion: row.emotion.into_vector()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    owner_kind: String,
    owner_id: i64,
    #[sqlx(flatten)]
    emotion: EmotionRow,
    dominant: String,
    sample_count: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let kind = OwnerKind::parse(&row.owner_kind).ok_or_else(|| {
            AppError::Internal(format!("Invalid owner kind in database: {}", row.owner_kind))
        })?;
        let dominant = EmotionLabel::parse(&row.dominant).ok_or_else(|| {
            AppError::Internal(format!("Invalid dominant label in database: {}", row.dominant))
        })?;

        Ok(Profile {
            owner: OwnerRef { kind, id: row.owner_id },
            vector: row.emotion.into_vector()?,
            dominant,
            sample_count: usize::try_from(row.sample_count).map_err(|_| {
                AppError::Internal(format!("Negative sample count: {}", row.sample_count))
            })?,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL implementation of both storage traits
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_review(&self, review_id: i64) -> AppResult<Option<Review>> {
        let row: Option<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reviews r JOIN review_emotions e ON e.review_id = r.id WHERE r.id = $1",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Review::try_from).transpose()
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, owner: OwnerRef) -> AppResult<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT owner_kind, owner_id, joy, sadness, anger, fear, disgust,
                   dominant, sample_count, updated_at
            FROM emotion_profiles
            WHERE owner_kind = $1 AND owner_id = $2
            "#,
        )
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::try_from).transpose()
    }

    async fn save_profile(&self, profile: &Profile) -> AppResult<()> {
        let v = profile.vector;
        sqlx::query(
            r#"
            INSERT INTO emotion_profiles
                (owner_kind, owner_id, joy, sadness, anger, fear, disgust,
                 dominant, sample_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (owner_kind, owner_id) DO UPDATE SET
                joy = EXCLUDED.joy,
                sadness = EXCLUDED.sadness,
                anger = EXCLUDED.anger,
                fear = EXCLUDED.fear,
                disgust = EXCLUDED.disgust,
                dominant = EXCLUDED.dominant,
                sample_count = EXCLUDED.sample_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.owner.kind.as_str())
        .bind(profile.owner.id)
        .bind(v.joy)
        .bind(v.sadness)
        .bind(v.anger)
        .bind(v.fear)
        .bind(v.disgust)
        .bind(profile.dominant.as_str())
        .bind(profile.sample_count as i64)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn movie_profiles(&self) -> AppResult<Vec<Profile>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(
            r#"
            SELECT owner_kind, owner_id, joy, sadness, anger, fear, disgust,
                   dominant, sample_count, updated_at
            FROM emotion_profiles
            WHERE owner_kind = 'movie'
            ORDER BY owner_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Profile::try_from).collect()
    }
}

#[async_trait::async_trait]
impl ReviewStore for PgStore {
    async fn owner_exists(&self, owner: OwnerRef) -> AppResult<bool> {
        let sql = match owner.kind {
            OwnerKind::Member => "SELECT EXISTS (SELECT 1 FROM members WHERE id = $1)",
            OwnerKind::Movie => "SELECT EXISTS (SELECT 1 FROM movies WHERE id = $1)",
        };
        let exists: bool = sqlx::query_scalar(sql)
            .bind(owner.id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn owner_ids(&self, kind: OwnerKind) -> AppResult<Vec<i64>> {
        let sql = match kind {
            OwnerKind::Member => "SELECT id FROM members ORDER BY id",
            OwnerKind::Movie => "SELECT id FROM movies ORDER BY id",
        };
        let ids: Vec<i64> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        Ok(ids)
    }

    async fn samples_for(&self, owner: OwnerRef) -> AppResult<Vec<EmotionVector>> {
        let sql = match owner.kind {
            OwnerKind::Member => {
                r#"
                SELECT e.joy, e.sadness, e.anger, e.fear, e.disgust
                FROM review_emotions e
                JOIN reviews r ON r.id = e.review_id
                WHERE r.member_id = $1
                ORDER BY r.id
                "#
            }
            OwnerKind::Movie => {
                r#"
                SELECT e.joy, e.sadness, e.anger, e.fear, e.disgust
                FROM review_emotions e
                JOIN reviews r ON r.id = e.review_id
                WHERE r.movie_id = $1
                ORDER BY r.id
                "#
            }
        };

        let rows: Vec<EmotionRow> = sqlx::query_as(sql)
            .bind(owner.id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(EmotionRow::into_vector).collect()
    }

    async fn likers_of(&self, movie_id: i64) -> AppResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT member_id FROM movie_likes WHERE movie_id = $1 ORDER BY member_id",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_member(&self, username: &str) -> AppResult<Member> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO members (username) VALUES ($1) RETURNING id, created_at",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("username {} is already taken", username))
            }
            other => AppError::Database(other),
        })?;

        Ok(Member {
            id,
            username: username.to_string(),
            created_at,
        })
    }

    async fn create_movie(&self, title: &str, release_year: Option<i32>) -> AppResult<Movie> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO movies (title, release_year) VALUES ($1, $2) RETURNING id, created_at",
        )
        .bind(title)
        .bind(release_year)
        .fetch_one(&self.pool)
        .await?;

        Ok(Movie {
            id,
            title: title.to_string(),
            release_year,
            created_at,
        })
    }

    async fn insert_review(&self, review: NewReview) -> AppResult<Review> {
        let mut tx = self.pool.begin().await?;

        let (id, created_at, updated_at): (i64, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO reviews (member_id, movie_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(review.member_id)
        .bind(review.movie_id)
        .bind(&review.content)
        .fetch_one(&mut *tx)
        .await?;

        let e = review.emotion;
        sqlx::query(
            r#"
            INSERT INTO review_emotions (review_id, joy, sadness, anger, fear, disgust)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(e.joy)
        .bind(e.sadness)
        .bind(e.anger)
        .bind(e.fear)
        .bind(e.disgust)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Review {
            id,
            member_id: review.member_id,
            movie_id: review.movie_id,
            content: review.content,
            emotion: review.emotion,
            created_at,
            updated_at,
        })
    }

    async fn get_review(&self, review_id: i64) -> AppResult<Option<Review>> {
        self.fetch_review(review_id).await
    }

    async fn update_review(
        &self,
        review_id: i64,
        content: Option<String>,
        emotion: EmotionVector,
    ) -> AppResult<Option<Review>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE reviews
            SET content = COALESCE($2, content), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(review_id)
        .bind(content)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE review_emotions
            SET joy = $2, sadness = $3, anger = $4, fear = $5, disgust = $6
            WHERE review_id = $1
            "#,
        )
        .bind(review_id)
        .bind(emotion.joy)
        .bind(emotion.sadness)
        .bind(emotion.anger)
        .bind(emotion.fear)
        .bind(emotion.disgust)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.fetch_review(review_id).await
    }

    async fn delete_review(&self, review_id: i64) -> AppResult<Option<Review>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reviews r JOIN review_emotions e ON e.review_id = r.id \
             WHERE r.id = $1 FOR UPDATE OF r",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // review_emotions rows go with the review via ON DELETE CASCADE
        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Review::try_from(row).map(Some)
    }

    async fn add_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO movie_likes (member_id, movie_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(member_id)
        .bind(movie_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_like(&self, member_id: i64, movie_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM movie_likes WHERE member_id = $1 AND movie_id = $2")
            .bind(member_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
