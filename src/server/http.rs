//! HTTP surface: `POST /api/papers/search` behind a per-identity rate limit.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use governor::{clock::Clock, clock::DefaultClock, DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::SearchError;
use crate::search::{PaperSearch, SearchRequest};

const USER_ID_HEADER: &str = "x-user-id";
/// Longest `x-user-id` prefix used as a limiter key.
const MAX_USER_ID_LEN: usize = 64;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    engine: Arc<PaperSearch>,
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl AppState {
    pub fn new(engine: Arc<PaperSearch>, requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(engine, Quota::per_minute(per_minute))
    }

    pub fn with_quota(engine: Arc<PaperSearch>, quota: Quota) -> Self {
        Self {
            engine,
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Forget identities whose quota has fully replenished.
    pub fn sweep_rate_limits(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::debug!(before, after = self.limiter.len(), "Swept rate limiter keys");
    }

    pub fn tracked_identities(&self) -> usize {
        self.limiter.len()
    }

    /// Run `sweep_rate_limits` every `period` in the background.
    pub fn spawn_sweeper(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                state.sweep_rate_limits();
            }
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/papers/search", post(search_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    let sweeper = state.spawn_sweeper(SWEEP_INTERVAL);
    let served = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await;
    sweeper.abort();
    served?;
    Ok(())
}

/// Caller identity: the `x-user-id` header, else the peer address.
fn identity(req: &Request) -> String {
    if let Some(user) = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        let user: String = user.chars().take(MAX_USER_ID_LEN).collect();
        return format!("user:{}", user);
    }
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = identity(&req);
    match state.limiter.check_key(&key) {
        Ok(()) => next.run(req).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().max(1);
            tracing::warn!(identity = %key, retry_after, "Rate limit exceeded");
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Rate limit exceeded" })),
            )
                .into_response();
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            resp
        }
    }
}

async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request body", "details": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.engine.search(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e @ SearchError::EmptyQuery) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Search failed", "details": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/papers/search");
        if let Some(user) = header {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_identity_prefers_header() {
        assert_eq!(identity(&request_with(Some("alice"))), "user:alice");
        assert_eq!(identity(&request_with(Some("  "))), "ip:unknown");

        let mut req = request_with(None);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5555))));
        assert_eq!(identity(&req), "ip:10.0.0.7");
    }

    #[test]
    fn test_identity_is_length_bounded() {
        let long = "x".repeat(10_000);
        let key = identity(&request_with(Some(&long)));
        assert_eq!(key.len(), "user:".len() + MAX_USER_ID_LEN);
    }

    #[tokio::test]
    async fn test_sweep_evicts_replenished_identities() {
        let engine = Arc::new(PaperSearch::new(Vec::new()));
        let quota = Quota::with_period(Duration::from_millis(20)).unwrap();
        let state = AppState::with_quota(engine, quota);

        for i in 0..50 {
            assert!(state.limiter.check_key(&format!("user:{i}")).is_ok());
        }
        assert_eq!(state.tracked_identities(), 50);

        tokio::time::sleep(Duration::from_millis(200)).await;
        state.sweep_rate_limits();
        assert_eq!(state.tracked_identities(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_identities() {
        let engine = Arc::new(PaperSearch::new(Vec::new()));
        let state = AppState::new(engine, 20);
        assert!(state.limiter.check_key(&"user:busy".to_string()).is_ok());
        state.sweep_rate_limits();
        assert_eq!(state.tracked_identities(), 1);
    }
}
