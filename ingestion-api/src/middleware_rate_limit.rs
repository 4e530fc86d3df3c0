use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api_state::ApiState, error::ApiError};

struct Bucket {
    count: u32,
    window_started_at: Instant,
}

/// Fixed-window token bucket per credential. A `RwLock<HashMap>` over a
/// plain map, not a concurrent map
/// crate, matching the same "rare structural mutation, frequent read"
/// shape the live fan-out registry uses -- buckets are added/reset far less
/// often than they are checked.
pub struct RateLimiter {
    limit_per_minute: u32,
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self { limit_per_minute, buckets: RwLock::new(HashMap::new()) }
    }

    /// Returns `true` when the request should proceed, `false` when the
    /// credential has exhausted its window. A stale window (older than a
    /// minute) resets the counter rather than carrying over debt.
    fn check(&self, credential: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.write().expect("rate limiter lock poisoned");
        let bucket = buckets.entry(credential.to_string()).or_insert_with(|| Bucket {
            count: 0,
            window_started_at: now,
        });

        if now.duration_since(bucket.window_started_at) >= Duration::from_secs(60) {
            bucket.count = 0;
            bucket.window_started_at = now;
        }

        if bucket.count >= self.limit_per_minute {
            return false;
        }
        bucket.count += 1;
        true
    }
}

/// Same `X-API-Key`-first, `Authorization: Bearer`-fallback precedence as
/// `middleware_api_auth`'s extractor, so a request's bucket key never
/// changes depending on which middleware inspects it first.
fn extract_credential(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .map(str::trim)
                .map(str::to_string)
        })
}

/// Runs before authentication so an unrecognized credential is still rate
/// limited by its literal header value; a request with no credential at all
/// is left for the auth middleware to reject.
pub async fn rate_limit(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(credential) = extract_credential(&request) {
        if !state.rate_limiter.check(&credential) {
            return Err(ApiError::RateLimitExceeded);
        }
    }
    Ok(next.run(request).await)
}
