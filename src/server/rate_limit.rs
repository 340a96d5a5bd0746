//! Fixed-window request limit per client address.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitSettings;

use super::ApiError;

/// Clients tracked at once; the least recently seen is forgotten first.
const MAX_TRACKED_CLIENTS: usize = 10_000;

struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per client key inside a fixed window.
pub struct RateLimiter {
    windows: Mutex<LruCache<String, Window>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        let capacity = NonZeroUsize::new(MAX_TRACKED_CLIENTS).unwrap_or(NonZeroUsize::MIN);
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
            window,
            max_requests: max_requests.max(1),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.window(), settings.max_requests)
    }

    /// Admits one request for `client`, or returns how long until its window
    /// resets.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.get_or_insert_mut(client.to_string(), || Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(window.started)));
        }
        window.count += 1;
        Ok(())
    }
}

/// Middleware for `from_fn_with_state`: answers 429 once a client exceeds
/// its window.
pub(crate) async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&request);
    match limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            debug!(%client, path = %request.uri().path(), "rate limit exceeded");
            ApiError::TooManyRequests { retry_after }.into_response()
        }
    }
}

/// Peer address when the server exposes it, else the first forwarded hop.
fn client_key(request: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_admits_max_then_resets() {
        let limiter = RateLimiter::new(Duration::from_secs(15), 2);
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_ok());

        tokio::time::advance(Duration::from_secs(5)).await;
        let wait = limiter.check("10.0.0.1").expect_err("third request is limited");
        assert_eq!(wait, Duration::from_secs(10));
        assert!(limiter.check("10.0.0.2").is_ok(), "clients are counted separately");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check("10.0.0.1").is_ok());
    }

    #[test]
    fn client_key_prefers_peer_address_over_forwarded_header() {
        let mut request = axum::http::Request::builder()
            .header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_key(&request), "203.0.113.7");

        let peer: SocketAddr = "192.0.2.4:5151".parse().expect("addr");
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_key(&request), "192.0.2.4");

        let bare = axum::http::Request::builder()
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_key(&bare), "unknown");
    }
}
