use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};
use crate::models::EmotionVector;

/// Keys for values memoized in Redis
///
/// The `Display` form is the Redis key. Recommendation keys embed the
/// normalized query components, so queries differing only in scale share
/// one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// Ranked movies for a normalized query vector and limit
    Recommendation { query: EmotionVector, limit: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendation { query, limit } => {
                let parts: Vec<String> = query.components().iter().map(|c| c.to_string()).collect();
                write!(f, "rec:{}:{}", limit, parts.join(","))
            }
        }
    }
}

/// Message for asynchronous cache writes
struct CacheWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
///
/// Reads go straight to Redis through a shared `ConnectionManager`. Writes
/// are queued on a channel and applied by a background task, so a slow
/// Redis never delays an API response.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    write_tx: mpsc::UnboundedSender<CacheWrite>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// The writer task drains every write already queued before it exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Connects to Redis and spawns the background writer task
    ///
    /// # Arguments
    /// * `redis_url`: Connection string such as `redis://localhost:6379`.
    ///
    /// Returns the cache together with the handle used to stop its writer.
    /// Fails if the URL is malformed or the initial connection is refused.
    pub async fn connect(redis_url: &str) -> AppResult<(Self, CacheWriterHandle)> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        // Spawn background task to process cache writes
        tokio::spawn(Self::writer_task(conn.clone(), write_rx, shutdown_rx));

        Ok((Self { conn, write_tx }, CacheWriterHandle { shutdown_tx }))
    }

    /// Background task that applies queued cache writes
    ///
    /// Receives write messages until the shutdown signal arrives, then closes
    /// the channel and flushes whatever is still queued before exiting.
    async fn writer_task(
        mut conn: ConnectionManager,
        mut write_rx: mpsc::UnboundedReceiver<CacheWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0_u64;

        loop {
            tokio::select! {
                // Process write messages
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write(&mut conn, msg).await {
                        failed_writes += 1;
                        tracing::error!(error = %e, failed_writes, "Failed to write to Redis cache");
                    }
                }
                // Shutdown signal received
                _ = shutdown_rx.recv() => {
                    tracing::info!(failed_writes, "Cache writer shutting down, flushing remaining writes");

                    // No new writes after this point; drain the backlog
                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write(&mut conn, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }
                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// Writes a single message to Redis with its TTL
    async fn write(conn: &mut ConnectionManager, msg: CacheWrite) -> AppResult<()> {
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key
    ///
    /// A hit is deserialized from JSON and returned; a missing key yields
    /// `None`. A value that no longer deserializes into `T` is reported as
    /// `AppError::Internal` rather than treated as a miss.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key.to_string()).await?;

        cached
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })
            })
            .transpose()
    }

    /// Stores a value in the cache without waiting for Redis
    ///
    /// # Arguments
    /// * `key`: Cache key; its `Display` form is the Redis key.
    /// * `value`: Serialized to JSON before queueing.
    /// * `ttl`: Expiry in seconds.
    ///
    /// Serialization failures and a stopped writer are logged and the write
    /// is dropped; callers never see an error.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWrite {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if self.write_tx.send(msg).is_err() {
            tracing::warn!(key = %key, "Cache writer stopped, dropping write");
        }
    }
}
