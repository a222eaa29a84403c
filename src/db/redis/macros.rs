/// Caches the result of an async computation in Redis.
///
/// Looks the key up first and returns the cached value on a hit. On a miss
/// the block is awaited, its successful result is queued for a background
/// write, and the value is returned. Errors from the block are passed
/// through and never cached.
///
/// A failed cache read does not fail the caller. It is logged and the block
/// is evaluated directly.
///
/// # Arguments
/// * `$cache`: The cache instance. It must provide `get_from_cache` and
///   `set_in_background`.
/// * `$key`: The `CacheKey` to read and write.
/// * `$ttl`: The time-to-live for a stored value, in seconds.
/// * `$block`: A future yielding `AppResult<T>`, awaited only on a miss.
///
/// Expands to an expression of type `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let ranked: AppResult<Vec<RankedMovie>> = cached!(cache, key, 60, async {
///     rank_from_store().await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        // Attempt to get the value from cache
        match $cache.get_from_cache(&$key).await {
            Ok(Some(hit)) => Ok(hit),
            Ok(None) => match $block.await {
                Ok(value) => {
                    // Store the computed value in cache
                    $cache.set_in_background(&$key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                tracing::warn!(error = %e, key = %$key, "Cache read failed, computing directly");
                $block.await
            }
        }
    }};
}
