use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{broadcast, Mutex};

use crate::config::RateLimitConfig;
use crate::response::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    opened_at: Instant,
}

/// 按客户端 IP 的固定窗口计数器
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u64,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max_requests,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(ip).or_insert(Window {
            count: 0,
            opened_at: now,
        });

        if now.duration_since(window.opened_at) >= self.window {
            *window = Window {
                count: 0,
                opened_at: now,
            };
        }

        let allowed = window.count < self.max_requests;
        if allowed {
            window.count += 1;
        }

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(window.opened_at))
            .as_secs();
        let epoch_now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.count),
            reset_at: epoch_now + reset_after,
        }
    }

    /// 清理已过期两个窗口以上的条目
    pub async fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.opened_at) <= self.window * 2);
        before - windows.len()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub general: RateLimiter,
    /// 生成课程、简化单元这类会调用外部生成器的请求
    pub generation: RateLimiter,
    pub window_secs: u64,
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            general: RateLimiter::new(config.window_secs, config.max_requests),
            generation: RateLimiter::new(config.window_secs, config.generation_max_requests),
            window_secs: config.window_secs,
        }
    }
}

fn is_generation_request(method: &Method, path: &str) -> bool {
    method == Method::POST
        && (path.ends_with("/generate") || path.ends_with("/simplify"))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    // 只挂在 /api 子路由上，这里看到的路径已去掉前缀
    let path = req.uri().path();
    let ip = extract_client_ip(req.headers(), state.config().trust_proxy);
    let limits = state.rate_limit();
    let mut decision = limits.general.check(ip).await;
    if decision.allowed && is_generation_request(req.method(), path) {
        decision = limits.generation.check(ip).await;
    }

    if !decision.allowed {
        tracing::warn!(%ip, path, "Rate limit exceeded");
        let mut response = AppError::too_many_requests("Too many requests").into_response();
        apply_headers(&mut response, &decision);
        if let Ok(value) = HeaderValue::from_str(&limits.window_secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, &decision);
    response
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    for (name, value) in [
        ("ratelimit-limit", decision.limit),
        ("ratelimit-remaining", decision.remaining),
        ("ratelimit-reset", decision.reset_at),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    }
}

pub fn extract_client_ip(headers: &HeaderMap, trust_proxy: bool) -> IpAddr {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_cleanup_loop(
    limits: Arc<RateLimitState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let purged = limits.general.purge_stale().await + limits.generation.purge_stale().await;
                if purged > 0 {
                    tracing::debug!(purged, "Rate limit windows purged");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit() {
        let limiter = RateLimiter::new(60, 2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.check(ip).await.allowed);
        let second = limiter.check(ip).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!limiter.check(ip).await.allowed);

        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert!(limiter.check(other).await.allowed);
    }

    #[tokio::test]
    async fn zero_window_resets_each_time() {
        let limiter = RateLimiter::new(0, 1);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.check(ip).await.allowed);
        assert!(limiter.check(ip).await.allowed);
        assert_eq!(limiter.purge_stale().await, 0);
    }

    #[test]
    fn forwarded_header_needs_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(extract_client_ip(&headers, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            extract_client_ip(&headers, true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn generation_paths_are_classified() {
        assert!(is_generation_request(&Method::POST, "/api/courses/generate"));
        assert!(is_generation_request(&Method::POST, "/api/units/u1/simplify"));
        assert!(!is_generation_request(&Method::GET, "/api/courses/c1/outline"));
        assert!(!is_generation_request(&Method::POST, "/api/units/u1/attempts"));
    }
}
