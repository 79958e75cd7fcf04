use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use etag_store::LocalStore;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

/// Result of a server-side cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    Error,
}

impl LookupOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Error => "error",
        }
    }
}

pub fn record_lookup(backend: &'static str, outcome: LookupOutcome) {
    counter!("etag_cache_lookups_total", "backend" => backend, "outcome" => outcome.as_str())
        .increment(1);
}

/// `stage` is where the 304 was decided: `precheck`, `filter` or `interceptor`.
pub fn record_not_modified(stage: &'static str) {
    counter!("etag_cache_not_modified_total", "stage" => stage).increment(1);
}

pub fn record_store(backend: &'static str, ok: bool) {
    if ok {
        counter!("etag_cache_stores_total", "backend" => backend).increment(1);
    } else {
        counter!("etag_cache_store_failures_total", "backend" => backend).increment(1);
    }
}

/// State for the admin router.
#[derive(Clone)]
pub struct MetricsState {
    pub local: Option<Arc<LocalStore>>,
    pub prometheus: PrometheusHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreMetrics {
    pub name: String,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub size: usize,
}

impl StoreMetrics {
    fn from_store(store: &LocalStore) -> Self {
        let stats = store.stats();
        let total = stats.hits + stats.misses;
        StoreMetrics {
            name: "local".to_string(),
            hit_rate: if total > 0 {
                stats.hits as f64 / total as f64
            } else {
                0.0
            },
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            size: stats.current_size,
        }
    }
}

/// GET /api/stats: one-shot local store stats.
pub async fn stats_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let local = state.local.as_deref().map(StoreMetrics::from_store);
    Json(serde_json::json!({ "local": local }))
}

/// `/metrics` (prometheus text) and `/api/stats`.
pub fn admin_router(state: MetricsState) -> Router {
    Router::new()
        .route("/api/stats", get(stats_handler))
        .route(
            "/metrics",
            get(|State(state): State<MetricsState>| async move { state.prometheus.render() }),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn stats_reports_local_store() {
        let store = Arc::new(LocalStore::default());
        store.insert("a".into(), Bytes::from_static(b"1"), Duration::from_secs(60));
        store.lookup("a");
        store.lookup("b");

        let state = MetricsState {
            local: Some(store),
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
        };
        let response = admin_router(state)
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["local"]["hits"], 1);
        assert_eq!(json["local"]["misses"], 1);
        assert_eq!(json["local"]["size"], 1);
        assert_eq!(json["local"]["hit_rate"], 0.5);
    }

    #[tokio::test]
    async fn stats_without_local_store() {
        let state = MetricsState {
            local: None,
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
        };
        let response = admin_router(state)
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["local"].is_null());
    }
}
