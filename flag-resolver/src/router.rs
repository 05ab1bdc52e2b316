use std::{future::ready, sync::Arc};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::trace::TraceLayer;

use crate::{api::endpoint, flags::resolver::FlagResolver};

#[derive(Clone)]
pub struct State {
    pub resolver: Arc<FlagResolver>,
}

pub fn router(resolver: Arc<FlagResolver>, metrics: Option<PrometheusHandle>) -> Router {
    let state = State { resolver };

    let flags_router = Router::new()
        .route("/flags", get(endpoint::get_flags).post(endpoint::save_flags))
        .route("/flags/reset", post(endpoint::reset_flags))
        .route(
            "/flags/:key",
            get(endpoint::get_flag).patch(endpoint::set_flag),
        )
        .route("/definitions", get(endpoint::get_definitions))
        .route(
            "/definitions/grouped",
            get(endpoint::get_grouped_definitions),
        )
        .route("/overrides", delete(endpoint::clear_overrides))
        .route(
            "/overrides/:scope_type/:scope_id",
            put(endpoint::save_overrides),
        )
        .route(
            "/overrides/:scope_type/:scope_id/load",
            post(endpoint::load_overrides),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Router::new()
        .route("/", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route(
            "/metrics",
            get(move || match metrics {
                Some(ref recorder_handle) => ready(recorder_handle.render()),
                None => ready("no metrics recorder installed".to_owned()),
            }),
        )
        .merge(flags_router)
}

pub async fn index() -> &'static str {
    "flag resolver"
}

pub fn setup_metrics_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt; // for `collect`
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    use super::*;
    use crate::test_utils::{setup_resolver, MockPersistence};

    async fn setup_app(persistence: &MockPersistence) -> Router {
        let resolver = Arc::new(setup_resolver(persistence));
        resolver.load_feature_flags().await;
        router(resolver, None)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_index_and_liveness() {
        let app = setup_app(&MockPersistence::new()).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"flag resolver");

        let response = app
            .oneshot(Request::builder().uri("/_liveness").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_unknown_flag_is_not_found() {
        let app = setup_app(&MockPersistence::new()).await;

        let (status, body) = send(app, Method::GET, "/flags/ghost_flag", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("unknown_flag"));
    }

    #[tokio::test]
    async fn test_patch_is_not_persisted() {
        let persistence = MockPersistence::new();
        let app = setup_app(&persistence).await;

        let (status, body) = send(
            app,
            Method::PATCH,
            "/flags/beta_search",
            Some(json!({"visible": true})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"key": "beta_search", "enabled": false, "visible": true, "override": false})
        );
        assert!(persistence.global_value("feature_flags").is_none());
    }

    #[tokio::test]
    async fn test_save_failure_is_service_unavailable() {
        let persistence = MockPersistence::new();
        let app = setup_app(&persistence).await;
        persistence.fail_writes(true);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/flags",
            Some(json!({"beta_search": {"enabled": true}})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], json!("persistence_unavailable"));

        let (_, body) = send(app, Method::GET, "/flags/beta_search", None).await;
        assert_eq!(body["enabled"], json!(false));
    }

    #[tokio::test]
    async fn test_invalid_scope_type_is_rejected() {
        let app = setup_app(&MockPersistence::new()).await;

        let (status, _) = send(
            app,
            Method::PUT,
            "/overrides/team/team1",
            Some(json!({"beta_search": {"enabled": true}})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = setup_app(&MockPersistence::new()).await;

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"no metrics recorder installed");
    }
}
