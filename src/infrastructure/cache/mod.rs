mod memory_store;
mod redis_store;
mod store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheResult, CacheStore, RateLimitState, CLICK_COUNTER_KEY};

#[cfg(test)]
pub use store::MockCacheStore;
