use std::sync::Arc;

use crate::application::services::LinkService;
use crate::metrics::CacheMetrics;
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub links: Arc<LinkService>,
    pub limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<CacheMetrics>,
    pub base_url: String,
}
