//! Per-client fixed-window rate limiting for the generation routes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::state::AppState;

pub trait RateLimiter: Send + Sync {
    /// Count one request for `client_key`; `false` means it must be rejected.
    fn check(&self, client_key: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per client in fixed windows that start at a client's first request.
///
/// At most `capacity` clients are tracked; when full, expired windows are
/// purged first and then the oldest window is evicted.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    capacity: usize,
    clients: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32, capacity: usize) -> Self {
        Self {
            window,
            max_requests,
            capacity: capacity.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window, config.max_requests, config.capacity)
    }

    pub fn check_at(&self, client_key: &str, now: Instant) -> bool {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(window) = clients.get_mut(client_key) {
            if now.duration_since(window.started) < self.window {
                if window.count >= self.max_requests {
                    return false;
                }
                window.count += 1;
                return true;
            }
            *window = Window {
                started: now,
                count: 1,
            };
            return self.max_requests > 0;
        }

        if clients.len() >= self.capacity {
            clients.retain(|_, w| now.duration_since(w.started) < self.window);
        }
        if clients.len() >= self.capacity {
            let oldest = clients
                .iter()
                .min_by_key(|(_, w)| w.started)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                clients.remove(&key);
            }
        }
        clients.insert(
            client_key.to_string(),
            Window {
                started: now,
                count: 1,
            },
        );
        self.max_requests > 0
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, client_key: &str) -> bool {
        self.check_at(client_key, Instant::now())
    }
}

/// The first `X-Forwarded-For` entry, else the peer address, else `"unknown"`.
pub fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_key(&req);
    if !state.rate_limiter.check(&client) {
        tracing::warn!(%client, path = %req.uri().path(), "rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}
