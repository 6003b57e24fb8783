use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::{AppConfig, HttpConfig};
use crate::extract::{limit_body, BodyLimits};
use crate::state::AppState;
use crate::{auth, videos};

fn cors_layer(http: &HttpConfig) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(&http.cors_origin)
        .with_context(|| format!("invalid CORS_ORIGIN {:?}", http.cors_origin))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let http = &state.config.http;
    let limits = BodyLimits {
        json: http.json_body_limit,
        form: http.form_body_limit,
    };

    let api = Router::new()
        .merge(auth::router(http.upload_body_limit))
        .merge(videos::router(http.upload_body_limit))
        .route("/health", get(|| async { "ok" }))
        .layer(middleware::from_fn_with_state(limits, limit_body));

    let app = Router::new()
        .nest("/api/v1", api)
        .fallback_service(ServeDir::new(&http.public_dir))
        .layer(cors_layer(http)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
        .with_state(state);
    Ok(app)
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::services::{register_user, RegisterInput};
    use crate::upload::IncomingFile;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn seed_ada(state: &AppState) {
        register_user(
            state,
            RegisterInput {
                username: "ada".into(),
                email: "ada@x.com".into(),
                display_name: "Ada".into(),
                password: "secret1".into(),
                avatar: Some(IncomingFile {
                    file_name: Some("ada.png".into()),
                    content_type: "image/png".into(),
                    body: bytes::Bytes::from_static(b"png"),
                }),
                cover_image: None,
            },
        )
        .await
        .unwrap();
    }

    fn multipart(boundary: &str, fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake()).unwrap();
        let req = Request::get("/api/v1/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn me_without_token_is_unauthorized_envelope() {
        let app = build_app(AppState::fake()).unwrap();
        let req = Request::get("/api/v1/users/me").body(Body::empty()).unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);
        assert_eq!(json["status_code"], 401);
    }

    #[tokio::test]
    async fn login_sets_cookies_that_authenticate_me() {
        let state = AppState::fake();
        seed_ada(&state).await;
        let app = build_app(state).unwrap();

        let (status, headers, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/users/login",
                json!({"username": "ada", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["user"]["username"], "ada");
        assert!(json["data"]["user"].get("password_hash").is_none());

        let cookies: Vec<String> = headers
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let access = cookies
            .iter()
            .find(|c| c.starts_with("access_token="))
            .expect("access cookie");
        assert!(access.contains("HttpOnly"));
        assert!(cookies.iter().any(|c| c.starts_with("refresh_token=")));

        let cookie_pair = access.split(';').next().unwrap().to_string();
        let req = Request::get("/api/v1/users/me")
            .header("Cookie", cookie_pair)
            .body(Body::empty())
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["email"], "ada@x.com");

        let anonymous = Request::get("/api/v1/users/me").body(Body::empty()).unwrap();
        let (status, _, _) = send(&app, anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_not_accepted_as_access_token() {
        let state = AppState::fake();
        seed_ada(&state).await;
        let app = build_app(state).unwrap();

        let (_, _, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/users/login",
                json!({"email": "ADA@x.com", "password": "secret1"}),
            ),
        )
        .await;
        let refresh = json["data"]["refresh_token"].as_str().unwrap();
        let access = json["data"]["access_token"].as_str().unwrap();

        let with = |token: &str| {
            Request::get("/api/v1/users/me")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&app, with(refresh)).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(send(&app, with(access)).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_accepts_url_encoded_body() {
        let state = AppState::fake();
        seed_ada(&state).await;
        let app = build_app(state).unwrap();

        let req = Request::post("/api/v1/users/login")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from("username=ada&password=secret1"))
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["access_token"].is_string());
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let app = build_app(AppState::fake()).unwrap();

        let big = "x".repeat(21 * 1024);
        let (status, _, json) = send(
            &app,
            json_request("POST", "/api/v1/users/login", json!({"username": big, "password": "p"})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["success"], false);

        let form = format!("username={}&password=p", "x".repeat(17 * 1024));
        let req = Request::post("/api/v1/users/login")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn register_over_multipart_leaves_no_scratch_files() {
        let state = AppState::fake();
        let scratch = state.stager.scratch_dir().to_path_buf();
        let app = build_app(state).unwrap();

        let boundary = "XBOUNDARY";
        let body = multipart(
            boundary,
            &[
                ("username", "Ada"),
                ("email", "ada@x.com"),
                ("display_name", "Ada Lovelace"),
                ("password", "secret1"),
            ],
            &[("avatar", "ada.png", &b"png-bytes"[..])],
        );
        let req = Request::post("/api/v1/users/register")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body.clone()))
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["username"], "ada");
        assert!(json["data"]["avatar_url"]
            .as_str()
            .unwrap()
            .starts_with("https://media.test/"));
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);

        let req = Request::post("/api/v1/users/register")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "username");
    }

    #[tokio::test]
    async fn cors_allows_only_configured_origin() {
        let app = build_app(AppState::fake()).unwrap();

        let req = Request::get("/api/v1/health")
            .header("Origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = send(&app, req).await;
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");

        let req = Request::get("/api/v1/health")
            .header("Origin", "http://evil.test")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = send(&app, req).await;
        assert!(headers.get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn static_files_are_served_from_public_dir() {
        let state = AppState::fake();
        let public = state.config.http.public_dir.clone();
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("hello.txt"), "hi").unwrap();
        let app = build_app(state).unwrap();

        let req = Request::get("/hello.txt").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hi");
    }

    async fn login_token(app: &Router) -> String {
        let (_, _, json) = send(
            app,
            json_request(
                "POST",
                "/api/v1/users/login",
                json!({"username": "ada", "password": "secret1"}),
            ),
        )
        .await;
        json["data"]["access_token"].as_str().unwrap().to_string()
    }

    fn assert_json_envelope(headers: &axum::http::HeaderMap, json: &Value, status: u16) {
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(json["success"], false);
        assert_eq!(json["status_code"], status);
    }

    #[tokio::test]
    async fn malformed_path_and_query_use_error_envelope() {
        let app = build_app(AppState::fake()).unwrap();

        let req = Request::get("/api/v1/videos/not-a-uuid").body(Body::empty()).unwrap();
        let (status, headers, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_json_envelope(&headers, &json, 400);

        let req = Request::get("/api/v1/videos?limit=abc").body(Body::empty()).unwrap();
        let (status, headers, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_json_envelope(&headers, &json, 400);
    }

    #[tokio::test]
    async fn non_multipart_upload_uses_error_envelope() {
        let app = build_app(AppState::fake()).unwrap();
        let (status, headers, json) = send(
            &app,
            json_request("POST", "/api/v1/users/register", json!({"username": "ada"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_json_envelope(&headers, &json, 400);
    }

    #[tokio::test]
    async fn oversized_multipart_upload_is_payload_too_large() {
        let state = AppState::fake();
        let limit = state.config.http.upload_body_limit;
        let app = build_app(state).unwrap();

        let boundary = "XBOUNDARY";
        let huge = vec![b'x'; limit + 1024];
        let body = multipart(
            boundary,
            &[("username", "ada"), ("email", "ada@x.com")],
            &[("avatar", "ada.png", &huge[..])],
        );
        let req = Request::post("/api/v1/users/register")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, headers, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_json_envelope(&headers, &json, 413);
    }

    #[tokio::test]
    async fn publish_reads_duration_field() {
        let state = AppState::fake();
        seed_ada(&state).await;
        let app = build_app(state).unwrap();
        let token = login_token(&app).await;

        let boundary = "XBOUNDARY";
        let body = multipart(
            boundary,
            &[("description", "first clip"), ("duration", "12.5")],
            &[
                ("video_file", "clip.mp4", &b"frames"[..]),
                ("thumbnail", "thumb.jpg", &b"jpeg"[..]),
            ],
        );
        let req = Request::post("/api/v1/videos")
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["duration"], 12.5);
        assert_eq!(json["data"]["views"], 0);
    }
}
