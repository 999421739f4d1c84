// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::require_bearer;
use crate::extraction::{CardDetails, WebPresence};
use crate::state::AppState;

pub mod extraction;
pub mod health;
pub mod welcome;
pub mod whoami;

/// Every API route is served under this prefix.
pub const API_PREFIX: &str = "/api/business_card_text_extraction";

fn api_path(path: &str) -> String {
    format!("{API_PREFIX}{path}")
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(&api_path("/whoami"), get(whoami::whoami))
        .route(&api_path("/token_verify"), get(whoami::whoami))
        .route(
            &api_path("/extract_text_using_gpt"),
            post(extraction::extract_text_using_gpt)
                .layer(DefaultBodyLimit::max(extraction::MAX_UPLOAD_BYTES)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_bearer,
        ));

    let public = Router::new()
        .route("/", get(welcome::root))
        .route(API_PREFIX, get(welcome::api_root))
        .route(&api_path("/health/live"), get(health::liveness))
        .route(&api_path("/health/ready"), get(health::readiness));

    Router::new()
        .merge(protected.merge(public).with_state(state))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Business Card Text Extraction API"),
    paths(
        welcome::root,
        welcome::api_root,
        whoami::whoami,
        extraction::extract_text_using_gpt,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            welcome::WelcomeResponse,
            whoami::WhoAmIResponse,
            extraction::ExtractTextResponse,
            CardDetails,
            WebPresence,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Welcome", description = "Landing endpoints"),
        (name = "Auth", description = "Bearer token verification"),
        (name = "Extraction", description = "Business card text extraction"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::VerifiedIdentity;
    use crate::extraction::{ExtractionError, ExtractionPipeline, ImageUpload};
    use crate::testutil::{jwks_json, test_state, token_for, valid_claims, KEY1_N, KEY1_PEM};
    use async_trait::async_trait;
    use axum::http::{header, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOUNDARY: &str = "card-boundary";

    struct StubPipeline;

    #[async_trait]
    impl ExtractionPipeline for StubPipeline {
        async fn extract(
            &self,
            identity: &VerifiedIdentity,
            image: ImageUpload,
        ) -> Result<CardDetails, ExtractionError> {
            Ok(CardDetails {
                agent_name: identity.name().map(str::to_string),
                email: Some(format!("{}-bytes@example.com", image.bytes.len())),
                ..CardDetails::default()
            })
        }
    }

    async fn jwks_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[("K1", KEY1_N)])))
            .mount(&server)
            .await;
        server
    }

    fn bearer(claims: &Value) -> String {
        format!("Bearer {}", token_for(KEY1_PEM, "K1", claims))
    }

    fn now_claims() -> Value {
        valid_claims(chrono::Utc::now().timestamp())
    }

    fn get_request(path: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn upload_request(authorization: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"card\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(api_path("/extract_text_using_gpt"))
            .header(header::AUTHORIZATION, authorization)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn whoami_returns_username() {
        let server = jwks_server().await;
        let app = router(test_state(&server));

        let response = app
            .oneshot(get_request(&api_path("/whoami"), Some(&bearer(&now_claims()))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            json_body(response).await,
            json!({"status": "ok", "username": "Ada Lovelace"})
        );
    }

    #[tokio::test]
    async fn token_verify_is_an_alias_of_whoami() {
        let server = jwks_server().await;
        let app = router(test_state(&server));

        let response = app
            .oneshot(get_request(
                &api_path("/token_verify"),
                Some(&bearer(&now_claims())),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["username"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn welcome_endpoints_are_public() {
        let server = jwks_server().await;
        let app = router(test_state(&server));

        let response = app.clone().oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["message"],
            "/api/business_card_text_extraction - Root '/'"
        );

        let response = app.oneshot(get_request(API_PREFIX, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["message"],
            "Welcome to the Business Card Text Extraction API"
        );
    }

    #[tokio::test]
    async fn foreign_audience_is_unauthorized_with_generic_body() {
        let server = jwks_server().await;
        let app = router(test_state(&server));
        let mut claims = now_claims();
        claims["aud"] = json!("api://other");

        let response = app
            .oneshot(get_request(&api_path("/whoami"), Some(&bearer(&claims))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "invalid_token");
        assert!(!body.to_string().contains("audience"));
    }

    #[tokio::test]
    async fn missing_or_wrong_scheme_is_bad_request() {
        let server = jwks_server().await;

        for authorization in [None, Some("Token abc"), Some("")] {
            let app = router(test_state(&server));
            let response = app
                .oneshot(get_request(&api_path("/whoami"), authorization))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{authorization:?}");
            assert_eq!(json_body(response).await["error_code"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn extract_text_hands_image_to_pipeline() {
        let server = jwks_server().await;
        let app = router(test_state(&server).with_pipeline(Arc::new(StubPipeline)));

        let response = app
            .oneshot(upload_request(&bearer(&now_claims()), "image/png", b"0123456789"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Text extracted successfully.");
        assert_eq!(body["data"]["agent_name"], "Ada Lovelace");
        assert_eq!(body["data"]["email"], "10-bytes@example.com");
        assert_eq!(body["data"]["phone_numbers"], json!([]));
    }

    #[tokio::test]
    async fn extract_text_rejects_non_images() {
        let server = jwks_server().await;
        let app = router(test_state(&server).with_pipeline(Arc::new(StubPipeline)));

        let response = app
            .oneshot(upload_request(&bearer(&now_claims()), "text/plain", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Invalid file type. Please upload an image file."
        );
    }

    #[tokio::test]
    async fn extract_text_requires_authentication_first() {
        let server = jwks_server().await;
        let app = router(test_state(&server).with_pipeline(Arc::new(StubPipeline)));

        let response = app
            .oneshot(upload_request("Token abc", "image/png", b"img"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error_code"], "invalid_request");
    }

    #[tokio::test]
    async fn extract_text_without_backend_is_unavailable() {
        let server = jwks_server().await;
        let app = router(test_state(&server));

        let response = app
            .oneshot(upload_request(&bearer(&now_claims()), "image/jpeg", b"img"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readiness_follows_key_cache() {
        let server = jwks_server().await;
        let state = test_state(&server);
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(get_request(&api_path("/health/ready"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["checks"]["jwks"], "unavailable");

        state.jwks.get(&state.tenant).await.unwrap();

        let response = app
            .oneshot(get_request(&api_path("/health/ready"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn liveness_and_docs_are_public() {
        let server = jwks_server().await;
        let app = router(test_state(&server));

        let response = app
            .clone()
            .oneshot(get_request(&api_path("/health/live"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_request("/redoc", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request("/openapi.json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        for path in ["/whoami", "/extract_text_using_gpt"] {
            assert!(doc["paths"].get(api_path(path)).is_some(), "{path}");
        }
        assert!(doc["components"]["securitySchemes"].get("bearer").is_some());
    }
}
