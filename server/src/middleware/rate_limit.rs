use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ApiError;

const DEFAULT_MAX_REQUESTS: usize = 10;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<DashMap<IpAddr, Vec<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    pub fn with_limits(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let cutoff = now - self.window;

        let mut entry = self.requests.entry(ip).or_insert_with(Vec::new);

        // Remove old entries
        entry.retain(|&timestamp| timestamp > cutoff);

        if entry.len() >= self.max_requests {
            return false;
        }

        entry.push(now);
        true
    }

    pub fn cleanup_old_entries(&self) {
        let cutoff = Instant::now() - self.window;

        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&timestamp| timestamp > cutoff);
            !timestamps.is_empty()
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn rate_limit_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let peer_addr = req
        .peer_addr()
        .ok_or(ApiError::RateLimitExceeded)?;

    let ip = peer_addr.ip();

    let rate_limiter = req
        .app_data::<actix_web::web::Data<RateLimiter>>()
        .ok_or_else(|| ApiError::Internal("rate limiter not configured".to_string()))?;

    if !rate_limiter.check_rate_limit(ip) {
        log::warn!("Rate limit exceeded for IP: {}", ip);
        return Err(ApiError::RateLimitExceeded.into());
    }

    next.call(req).await
}
