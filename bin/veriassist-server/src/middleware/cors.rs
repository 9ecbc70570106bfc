use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;

/// CORS for the chat page and API.
///
/// `VERIASSIST_CORS_ORIGINS` restricts the allowed origins; when it is unset
/// or holds no valid origin, any origin is allowed.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn preflight(config: &Config, origin: &str) -> axum::http::Response<Body> {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(cors_layer(config));
        app.oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/health")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn unset_origins_allow_any() {
        let response = preflight(&Config::for_tests(), "http://example.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn blank_origin_list_allows_any() {
        for blank in ["", " , "] {
            let mut config = Config::for_tests();
            config.cors_allowed_origins = Some(blank.into());
            let response = preflight(&config, "http://example.com").await;
            assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        }
    }

    #[tokio::test]
    async fn configured_origin_is_echoed() {
        let mut config = Config::for_tests();
        config.cors_allowed_origins = Some("http://localhost:8000, http://127.0.0.1:8000".into());

        let allowed = preflight(&config, "http://localhost:8000").await;
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:8000"
        );

        let denied = preflight(&config, "http://evil.example").await;
        assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
