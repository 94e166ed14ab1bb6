use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use wfh_core::config::ServerConfig;
use wfh_db::DbPool;

use crate::api::{self, ApiState, ErrorBody};
use crate::context::assign_correlation_id;
use crate::health;

pub const BANNER: &str = "WFH Api is running";

/// Full HTTP surface with CORS, request timeout, tracing and correlation ids applied.
pub fn build(state: ApiState, db_pool: DbPool, server: &ServerConfig) -> Router {
    let routes = Router::new()
        .route("/", get(|| async { BANNER }))
        .merge(api::router(state))
        .merge(health::router(db_pool));
    with_layers(routes, server)
}

fn with_layers(routes: Router, server: &ServerConfig) -> Router {
    routes
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
        .layer(middleware::map_response(timeout_message))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(assign_correlation_id))
}

/// The timeout layer answers with an empty 408; handlers never produce one themselves.
async fn timeout_message(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }

    warn!(
        event_name = "api.request.timed_out",
        correlation_id = "timeout",
        "request exceeded server.request_timeout_secs"
    );
    let body = ErrorBody { message: "request timed out".to_string() };
    (StatusCode::REQUEST_TIMEOUT, Json(body)).into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    event_name = "system.cors.origin_skipped",
                    correlation_id = "bootstrap",
                    origin = %origin,
                    error = %error,
                    "ignoring allowed origin that is not a valid header value"
                );
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(allowed)).allow_methods(Any).allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wfh_core::config::{default_allowed_origins, ServerConfig};
    use wfh_db::connect_with_settings;

    use super::{build, with_layers, BANNER};
    use crate::api::tests::state;
    use crate::context::CORRELATION_HEADER;

    fn server_config(request_timeout_secs: u64) -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 5030,
            request_timeout_secs,
            graceful_shutdown_secs: 1,
            allowed_origins: default_allowed_origins(5030),
        }
    }

    async fn app() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        build(state(), pool, &server_config(5))
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let app = app().await;

        let (status, body) = call(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String(BANNER.to_string()));

        let (status, body) = call(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["database"]["status"], json!("ready"));
    }

    #[tokio::test]
    async fn http_scenario_approve_approve_then_reject() {
        let app = app().await;

        let (status, created) = call(
            &app,
            post_json("/api/applications", json!({"dates": ["2025-08-15"], "type": "regular"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let app_id = created["appId"].as_i64().expect("appId");

        let (_, listed) = call(&app, get("/api/applications")).await;
        assert_eq!(listed[0]["appId"], json!(app_id));
        assert_eq!(listed[0]["status"], json!("pending_section"));
        assert_eq!(listed[0]["type"], json!("regular"));

        let (status, body) = call(&app, post_json("/api/approve", json!({"appId": app_id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "pending_department"}));

        let (status, body) = call(&app, post_json("/api/approve", json!({"appId": app_id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "approved"}));

        let (status, body) = call(&app, post_json("/api/reject", json!({"appId": app_id}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "cannot reject in state approved"}));

        let (status, trail) = call(&app, get(&format!("/api/approvals?appId={app_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let trail = trail.as_array().expect("array");
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0]["sequence"], json!(1));
        assert_eq!(trail[1]["sequence"], json!(2));
        assert_eq!(trail[1]["actorRole"], json!("department_head"));
    }

    #[tokio::test]
    async fn errors_use_message_bodies() {
        let app = app().await;

        let (status, body) = call(&app, post_json("/api/approve", json!({"appId": 31337}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "application 31337 not found"}));

        let (status, body) = call(&app, post_json("/api/approve", json!({"comment": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));

        let (status, body) = call(&app, get("/api/approvals?appId=987654")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn bearer_tokens_drive_identity_and_bad_tokens_are_refused() {
        let app = app().await;

        let (status, body) = call(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/api/applications")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::from(json!({"dates": ["2025-08-15"]}).to_string()))
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "invalid token"}));
    }

    #[tokio::test]
    async fn responses_carry_correlation_ids() {
        let app = app().await;

        let request = Request::builder()
            .uri("/")
            .header(CORRELATION_HEADER, "client-supplied-1")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(
            response.headers().get(CORRELATION_HEADER).and_then(|v| v.to_str().ok()),
            Some("client-supplied-1")
        );

        let response = app.oneshot(get("/")).await.expect("response");
        assert!(response.headers().contains_key(CORRELATION_HEADER));
    }

    #[tokio::test]
    async fn cors_allows_only_configured_origins() {
        let app = app().await;
        let preflight = |origin: &str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/applications")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .expect("request")
        };

        let allowed = app
            .clone()
            .oneshot(preflight("https://rachelchiang2002-lab.github.io"))
            .await
            .expect("response");
        assert_eq!(
            allowed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("https://rachelchiang2002-lab.github.io")
        );

        let denied = app.oneshot(preflight("https://evil.example")).await.expect("response");
        assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn timed_out_requests_get_a_message_body() {
        let slow = Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                "late"
            }),
        );
        let app = with_layers(slow, &server_config(1));

        let response = app.oneshot(get("/slow")).await.expect("response");
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        let bytes = to_bytes(response.into_body(), 1024).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body, json!({"message": "request timed out"}));
    }
}
