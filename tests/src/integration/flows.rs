//! # Request Flows
//!
//! Drives the full router (access log, CORS, rate limit, auth, routing,
//! forwarding) against stub upstreams:
//!
//! 1. **Public endpoints**: health, login
//! 2. **Auth**: missing, expired, and valid tokens; per-method product rules
//! 3. **Routing**: unknown paths, optional services
//! 4. **Failure handling**: unreachable upstreams, throttling

#[cfg(test)]
mod tests {
    use super::super::support::*;
    use api_gateway::TokenCodec;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    // =============================================================================
    // PUBLIC ENDPOINTS
    // =============================================================================

    #[tokio::test]
    async fn test_health_is_public_and_never_throttled() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config.rate_limit.requests = 1;
        let router = router(config);

        for _ in 0..5 {
            let response = get(&router, "/api/public/health", None).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = json_body(response).await;
            assert_eq!(json["status"], "UP");
            assert_eq!(json["message"], "API Gateway is running smoothly!");
        }
        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_login_then_profile() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let (status, json) = login(&router, "user123", "password123").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user_id"], "USR_001");
        assert_eq!(json["username"], "user123");
        assert!(json["expires_at"].is_string());
        let token = json["token"].as_str().unwrap().to_string();

        let response = get(&router, "/api/v1/users/profile", Some(&bearer(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile = json_body(response).await;
        assert_eq!(profile["user_id"], "USR_001");
        assert_eq!(profile["name"], "John Doe");
        assert_eq!(upstream.hits(), 1);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let (status, json) = login(&router, "admin", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid username or password");

        let (status, json) = login(&router, "", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    // =============================================================================
    // AUTH
    // =============================================================================

    #[tokio::test]
    async fn test_profile_without_token() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let response = get(&router, "/api/v1/users/profile", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert!(response.headers().contains_key("x-request-id"));
        let json = json_body(response).await;
        assert_eq!(json["code"], "MISSING_AUTH_HEADER");
        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_malformed_authorization_header() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));
        let token = token_for("USR_001", "user123");

        for auth in [
            format!("bearer {}", token),
            format!("Bearer {} extra", token),
            "Bearer".to_string(),
        ] {
            let response = get(&router, "/api/v1/users/profile", Some(&auth)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await["code"], "MALFORMED_AUTH_HEADER");
        }
        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let issued_at = Utc::now() - ChronoDuration::hours(2);
        let expired = codec()
            .issue_at("USR_001", "user123", Duration::from_secs(3600), issued_at)
            .unwrap();

        let response = get(
            &router,
            "/api/v1/users/profile",
            Some(&bearer(&expired.token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "TOKEN_EXPIRED");
        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_foreign_token() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let foreign = TokenCodec::new(b"another-gateway-secret-entirely!!", "api-gateway")
            .issue("USR_001", "user123", Duration::from_secs(3600))
            .unwrap();
        let response = get(
            &router,
            "/api/v1/users/profile",
            Some(&bearer(&foreign.token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn test_product_reads_are_public_and_idempotent() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let first = get(&router, "/api/v1/products/item/prod001", None).await;
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;

        let second = get(&router, "/api/v1/products/item/prod001", None).await;
        assert_eq!(second.status(), StatusCode::OK);
        let second = json_body(second).await;

        assert_eq!(first, second);
        assert_eq!(first["id"], "prod001");
        assert_eq!(upstream.hits(), 2);
    }

    #[tokio::test]
    async fn test_product_writes_require_token() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let req = Request::builder()
                .method(method.clone())
                .uri("/api/v1/products/")
                .body(Body::from(r#"{"name":"Desk"}"#))
                .unwrap();
            let response = send(&router, req).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", method);
        }
        assert_eq!(upstream.hits(), 0);

        let token = token_for("ADM_001", "admin");
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/products/")
            .header(header::AUTHORIZATION, bearer(&token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Desk"}"#))
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let echoed = json_body(response).await;
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/api/products/");
        assert_eq!(echoed["body"], r#"{"name":"Desk"}"#);
        assert_eq!(upstream.hits(), 1);
    }

    // =============================================================================
    // ROUTING
    // =============================================================================

    #[tokio::test]
    async fn test_unknown_paths() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));
        let token = token_for("USR_001", "user123");

        for path in ["/api/v1/unknown", "/api/v1/usersettings", "/", "/api/v2/users/1"] {
            let response = get(&router, path, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
            assert_eq!(json_body(response).await["code"], "ROUTE_NOT_FOUND");

            // A token changes nothing for unmatched paths
            let response = get(&router, path, Some(&bearer(&token))).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        // Method not served for this prefix
        let req = Request::builder()
            .method(Method::PATCH)
            .uri("/api/v1/products/1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&router, req).await.status(), StatusCode::NOT_FOUND);

        // Wrong method on the gateway's own endpoints
        for (method, path) in [
            (Method::GET, "/auth/login"),
            (Method::POST, "/api/public/health"),
            (Method::DELETE, "/auth/login"),
        ] {
            let req = Request::builder()
                .method(method.clone())
                .uri(path)
                .body(Body::empty())
                .unwrap();
            let response = send(&router, req).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, path);
            assert_eq!(json_body(response).await["code"], "ROUTE_NOT_FOUND");
        }

        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_orders_only_when_configured() {
        let upstream = spawn_upstream().await;
        let token = token_for("USR_001", "user123");

        let without = router(config_for(&upstream));
        let response = get(&without, "/api/v1/orders/17", Some(&bearer(&token))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let with = router(with_orders(config_for(&upstream), &upstream));
        let response = get(&with, "/api/v1/orders/17", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get(&with, "/api/v1/orders/17", Some(&bearer(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["path"], "/api/orders/17");
    }

    // =============================================================================
    // FAILURE HANDLING
    // =============================================================================

    #[tokio::test]
    async fn test_unreachable_upstream_is_502_without_details() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config
            .services
            .endpoints
            .insert("product_service".into(), "http://127.0.0.1:1/api/products".into());
        let router = router(config);

        let response = get(&router, "/api/v1/products/item/prod001", None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["code"], "UPSTREAM_UNAVAILABLE");
        assert_eq!(json["message"], "The upstream service is unavailable.");
        assert!(!body.contains("127.0.0.1"));
        assert!(!body.to_lowercase().contains("connect"));
    }

    #[tokio::test]
    async fn test_rate_limited_after_burst() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config.rate_limit.requests = 3;
        config.rate_limit.window = Duration::from_secs(60);
        let router = router(config);

        for _ in 0..3 {
            let response = get(&router, "/api/v1/products/item/prod001", None).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = get(&router, "/api/v1/products/item/prod001", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=20).contains(&retry_after));
        let json = json_body(response).await;
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(
            json["message"],
            "You have exceeded the request limit. Please try again later."
        );

        // Throttling happens before routing and auth
        let response = get(&router, "/api/v1/users/profile", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(upstream.hits(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_disabled() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config.rate_limit.enabled = false;
        config.rate_limit.requests = 1;
        let router = router(config);

        for _ in 0..5 {
            let response = get(&router, "/api/v1/products/item/prod001", None).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_cors_preflight_answered_at_the_edge() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/users/profile")
            .header(header::ORIGIN, "https://shop.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().contains_key("x-request-id"));

        // Regular responses carry CORS headers too, including errors
        let req = Request::builder()
            .uri("/api/v1/users/profile")
            .header(header::ORIGIN, "https://shop.example.com")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        assert_eq!(upstream.hits(), 0);
    }
}
