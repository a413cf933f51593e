use axum::{
    routing::{get, post},
    Router,
};
use cadence_core::CadenceConfig;
use cadence_scheduler::SweepScheduler;
use std::sync::Arc;

/// Shared state passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: CadenceConfig,
    pub scheduler: SweepScheduler,
}

impl AppState {
    pub fn new(config: CadenceConfig, scheduler: SweepScheduler) -> Self {
        Self { config, scheduler }
    }
}

/// Assemble the operator router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{health, scheduler};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/scheduler/status", get(scheduler::status_handler))
        .route("/scheduler/start", post(scheduler::start_handler))
        .route("/scheduler/stop", post(scheduler::stop_handler))
        .route("/scheduler/sweep", post(scheduler::sweep_handler))
        .route("/scheduler/recompute", post(scheduler::recompute_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use cadence_scheduler::SweepSettings;
    use cadence_sessions::{NewSession, ScheduleText, SqliteSessionStore};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn state_with_session() -> Arc<AppState> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        cadence_sessions::db::init_db(&conn).unwrap();
        let store = Arc::new(SqliteSessionStore::new(conn));
        store
            .create(&NewSession {
                name: "all-day".to_string(),
                schedule: ScheduleText::new("00:00", "23:59", "23:59"),
            })
            .await
            .unwrap();

        let config = CadenceConfig::default();
        let settings = SweepSettings::from_config(&config.scheduler).unwrap();
        let scheduler = SweepScheduler::new(store, settings, None);
        Arc::new(AppState::new(config, scheduler))
    }

    async fn call(router: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_scheduler_state() {
        let router = build_router(state_with_session().await);
        let (status, body) = call(router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["scheduler_running"], false);
    }

    #[tokio::test]
    async fn manual_sweep_returns_report() {
        let router = build_router(state_with_session().await);
        let (status, body) = call(router, "POST", "/scheduler/sweep").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["examined"], 1);
    }

    #[tokio::test]
    async fn start_then_stop_round_trip() {
        let state = state_with_session().await;

        let (_, body) = call(build_router(state.clone()), "POST", "/scheduler/start").await;
        assert_eq!(body["outcome"], "started");
        let (_, body) = call(build_router(state.clone()), "POST", "/scheduler/start").await;
        assert_eq!(body["outcome"], "already_running");

        let (_, body) = call(build_router(state.clone()), "GET", "/scheduler/status").await;
        assert_eq!(body["is_running"], true);
        assert_eq!(body["cadence"], "every 30s");
        assert_eq!(body["daily_recompute"], "daily at 00:05");

        let (_, body) = call(build_router(state.clone()), "POST", "/scheduler/stop").await;
        assert_eq!(body["was_running"], true);
        let (_, body) = call(build_router(state), "POST", "/scheduler/stop").await;
        assert_eq!(body["was_running"], false);
    }

    #[tokio::test]
    async fn recompute_honours_force_flag() {
        let state = state_with_session().await;

        let (status, body) =
            call(build_router(state.clone()), "POST", "/scheduler/recompute").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forced"], false);
        assert_eq!(body["updated"], 1);

        let (_, body) = call(
            build_router(state),
            "POST",
            "/scheduler/recompute?force=true",
        )
        .await;
        assert_eq!(body["forced"], true);
        assert_eq!(body["updated"], 1);
    }
}
