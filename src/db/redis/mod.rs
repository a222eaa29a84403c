pub mod cache;

mod macros;

pub use cache::Cache;
pub use cache::CacheKey;
pub use cache::CacheWriterHandle;
