//! # Forwarding Semantics
//!
//! Checks what the upstream actually receives: rewritten path, query string,
//! forwarding headers, request id, and body.

#[cfg(test)]
mod tests {
    use super::super::support::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };

    #[tokio::test]
    async fn test_suffix_and_query_are_preserved() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));
        let token = token_for("USR_001", "user123");

        let response = get(
            &router,
            "/api/v1/users/42/orders?limit=5&sort=desc",
            Some(&bearer(&token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let echoed = json_body(response).await;
        assert_eq!(echoed["method"], "GET");
        assert_eq!(echoed["path"], "/api/users/42/orders");
        assert_eq!(echoed["query"], "limit=5&sort=desc");
        // The bearer token is passed through untouched
        assert_eq!(echoed["authorization"], bearer(&token));
    }

    #[tokio::test]
    async fn test_forwarding_headers() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let req = Request::builder()
            .uri("/api/v1/products/catalog")
            .header(header::HOST, "gateway.example.com")
            .header("x-forwarded-for", "198.51.100.7")
            .header(header::CONNECTION, "x-hop")
            .header("x-hop", "drop-me")
            .header("x-request-id", "trace-abc")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "trace-abc");

        let echoed = json_body(response).await;
        assert_eq!(echoed["path"], "/api/products/catalog");
        // No connect info in-process, so the peer is loopback
        assert_eq!(echoed["x_forwarded_for"], "198.51.100.7, 127.0.0.1");
        assert_eq!(echoed["x_forwarded_host"], "gateway.example.com");
        assert_eq!(echoed["x_request_id"], "trace-abc");
        assert!(echoed["connection_hop"].is_null());
    }

    #[tokio::test]
    async fn test_generated_request_id_reaches_upstream() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        let response = get(&router, "/api/v1/products", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()["x-request-id"]
            .to_str()
            .unwrap()
            .to_string();
        let echoed = json_body(response).await;

        assert_eq!(echoed["path"], "/api/products");
        assert_eq!(echoed["x_request_id"], id.as_str());
    }

    #[tokio::test]
    async fn test_upstream_status_is_relayed() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        // The stub has no DELETE handler for this path, so axum answers 405
        let token = token_for("ADM_001", "admin");
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/api/v1/products/item/prod001")
            .header(header::AUTHORIZATION, bearer(&token))
            .body(Body::empty())
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(upstream.hits(), 1);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config.upstream.max_request_body = 16;
        let router = router(config);

        let token = token_for("ADM_001", "admin");
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/products/item/prod001")
            .header(header::AUTHORIZATION, bearer(&token))
            .body(Body::from("x".repeat(64)))
            .unwrap();
        let response = send(&router, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_REQUEST_BODY");
        assert_eq!(upstream.hits(), 0);
    }

    #[tokio::test]
    async fn test_trusted_proxy_hop_is_appended() {
        let upstream = spawn_upstream().await;
        let mut config = config_for(&upstream);
        config.security.trust_localhost = true;
        config.rate_limit.requests = 1;
        let router = router(config);

        for client in ["198.51.100.7", "198.51.100.8"] {
            let req = Request::builder()
                .uri("/api/v1/products/catalog")
                .header("x-forwarded-for", client)
                .body(Body::empty())
                .unwrap();
            let response = send(&router, req).await;
            // Each forwarded client has its own bucket
            assert_eq!(response.status(), StatusCode::OK);

            let echoed = json_body(response).await;
            assert_eq!(
                echoed["x_forwarded_for"],
                format!("{}, 127.0.0.1", client).as_str()
            );
        }
        assert_eq!(upstream.hits(), 2);
    }

    #[tokio::test]
    async fn test_dot_segments_cannot_escape_the_base_path() {
        let upstream = spawn_upstream().await;
        let router = router(config_for(&upstream));

        for path in [
            "/api/v1/products/../../secret",
            "/api/v1/products/%2e%2e/%2e%2e/secret",
            "/api/v1/products/%2E%2E/users/profile",
            "/api/v1/products/./item/prod001",
        ] {
            let response = get(&router, path, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
            assert_eq!(json_body(response).await["code"], "ROUTE_NOT_FOUND");
        }
        assert_eq!(upstream.hits(), 0);
    }
}
