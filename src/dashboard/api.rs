//! Dashboard HTTP API
//!
//! Every handler reads one snapshot from the store; none of them can observe
//! a cycle in progress.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::ApiResponse;
use crate::snapshot::SnapshotStore;
use crate::types::{Pair, Signal};

/// Create the API router with all endpoints
pub fn create_router(store: Arc<SnapshotStore>) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/signals/:kind", get(get_signals))
        .route("/api/health", get(get_health))
        .with_state(store)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /api/snapshot - Latest published snapshot
async fn get_snapshot(State(store): State<Arc<SnapshotStore>>) -> Response {
    let snapshot = store.read();
    Json(ApiResponse::success(snapshot.as_ref())).into_response()
}

/// GET /api/signals/:kind - One strategy's signal for every pair
async fn get_signals(
    Path(kind): Path<String>,
    State(store): State<Arc<SnapshotStore>>,
) -> impl IntoResponse {
    match store.signals_by_strategy_name(&kind) {
        Ok(signals) => (StatusCode::OK, Json(ApiResponse::success(signals))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<BTreeMap<Pair, Signal>>::error(e.to_string())),
        ),
    }
}

/// GET /api/health - Generation, last publish and per-source outcomes
async fn get_health(State(store): State<Arc<SnapshotStore>>) -> impl IntoResponse {
    Json(ApiResponse::success(store.health()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::signals::PairSignals;
    use crate::types::{Direction, StrategyKind};

    fn store_with_btc() -> Arc<SnapshotStore> {
        let store = Arc::new(SnapshotStore::new());
        let btc = Pair::new("BTC", "USD");
        let now = Utc::now();
        let make = |kind| Signal {
            kind,
            pair: btc.clone(),
            direction: Direction::Up,
            magnitude: 0.01,
            confidence: 0.8,
            low_confidence: false,
            generated_at: now,
        };
        let mut next = store.read().successor(now);
        next.update(
            btc.clone(),
            PairSignals {
                momentum: make(StrategyKind::Momentum),
                reversal: make(StrategyKind::Reversal),
                range: make(StrategyKind::Range),
            },
        );
        store.publish(next);
        store
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn snapshot_endpoint_returns_current_generation() {
        let (status, body) = get_json(create_router(store_with_btc()), "/api/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["generation"], 1);
        assert_eq!(body["data"]["pairs"]["BTC-USD"]["range"]["kind"], "range");
    }

    #[tokio::test]
    async fn signals_endpoint_filters_by_strategy() {
        let (status, body) =
            get_json(create_router(store_with_btc()), "/api/signals/momentum").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["BTC-USD"]["kind"], "momentum");
        assert_eq!(body["data"]["BTC-USD"]["direction"], "up");
    }

    #[tokio::test]
    async fn unknown_strategy_is_bad_request() {
        let (status, body) =
            get_json(create_router(store_with_btc()), "/api/signals/arbitrage").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .expect("error message")
            .contains("arbitrage"));
    }

    #[tokio::test]
    async fn health_before_first_cycle() {
        let (status, body) =
            get_json(create_router(Arc::new(SnapshotStore::new())), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["generation"], 0);
        assert!(body["data"]["last_publish"].is_null());
    }
}
