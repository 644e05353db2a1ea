//! Request routing.
//!
//! | Method     | Path                        | Handler                   |
//! |------------|-----------------------------|---------------------------|
//! | GET, HEAD  | `/speedtest`, `/speedtest/` | full download             |
//! | POST       | `/speedtest`, `/speedtest/` | upload sink               |
//! | GET, HEAD  | `/speedtest/range/{token}`  | ranged download           |
//! | POST       | `/speedtest/range/{token}`  | ranged upload sink        |
//! | GET, HEAD  | `/netflix/speedtest/v2`     | OCA directory             |
//! | POST       | `/telemetry/cl2`            | telemetry sink            |
//! | GET, HEAD  | anything else               | static file from the root |
//!
//! CORS preflights are answered ahead of routing, so they never reach a
//! handler.

use crate::directory;
use crate::middleware::{log_request, preflight};
use crate::speed::{self, ContentServer};
use crate::telemetry;
use axum::extract::Request;
use axum::http::{Response, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Build the application for one server instance.
pub fn build(content: ContentServer, static_dir: &Path, http_logging: bool) -> Router {
    let static_files =
        ServiceExt::<Request>::map_response(ServeDir::new(static_dir), permanent_redirect);

    let mut router = Router::new()
        .route("/speedtest", get(speed::download).post(speed::upload))
        .route("/speedtest/", get(speed::download).post(speed::upload))
        .route(
            "/speedtest/range/{token}",
            get(speed::download_range).post(speed::upload_range),
        )
        .route("/netflix/speedtest/v2", get(directory::handle))
        .route("/telemetry/cl2", post(telemetry::handle))
        .fallback_service(static_files)
        .with_state(content);

    if http_logging {
        router = router.layer(middleware::from_fn(log_request));
    }
    router.layer(middleware::from_fn(preflight))
}

/// Directories requested without a trailing slash move permanently.
fn permanent_redirect<B>(mut response: Response<B>) -> Response<B> {
    if response.status() == StatusCode::TEMPORARY_REDIRECT {
        *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayloadConfig;
    use crate::payload::PayloadSource;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Method};
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;

    const MAX: u64 = 16 * 1024;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "fastclone-router-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(root.join("assets")).unwrap();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("index.html"), "<html>hi</html>").unwrap();
        std::fs::write(root.join("sub/index.html"), "<html>sub</html>").unwrap();
        std::fs::write(root.join("assets/app.js"), "console.log(1)").unwrap();
        std::fs::write(root.join("a b.txt"), "spaced").unwrap();
        root
    }

    fn app(root: &Path) -> Router {
        let config = PayloadConfig {
            max_payload_bytes: MAX,
            read_buffer_size: MAX,
        };
        let payload = Arc::new(PayloadSource::generate(&config).unwrap());
        build(ContentServer::new(payload), root, true)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap();
        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get_path(app: &Router, uri: &str) -> Response<Body> {
        send(app, Method::GET, uri, Body::empty()).await
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_speedtest_routes() {
        let root = temp_root("speedtest");
        let app = app(&root);

        for uri in ["/speedtest", "/speedtest/", "/speedtest?e=123"] {
            let response = get_path(&app, uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            assert_eq!(body_bytes(response).await.len() as u64, MAX, "{}", uri);
        }

        let range = get_path(&app, "/speedtest/range/0-2047").await;
        assert_eq!(range.status(), StatusCode::OK);
        assert_eq!(body_bytes(range).await.len(), 2048);

        let head = send(&app, Method::HEAD, "/speedtest", Body::empty()).await;
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(
            head.headers().get(header::CONTENT_LENGTH).unwrap(),
            &MAX.to_string()
        );

        for uri in ["/speedtest", "/speedtest/range/0-0", "/speedtest/range/0-4"] {
            let response = send(&app, Method::POST, uri, Body::from("12345")).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            assert!(body_bytes(response).await.is_empty());
        }

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_range_token_is_one_segment() {
        let root = temp_root("segment");
        let app = app(&root);

        let bad = get_path(&app, "/speedtest/range/abc").await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        // Empty or multi-segment tokens fall through to the static root
        for uri in ["/speedtest/range/", "/speedtest/range/0-1/x"] {
            assert_eq!(get_path(&app, uri).await.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_directory_and_telemetry() {
        let root = temp_root("aux");
        let app = app(&root);

        let directory = get_path(&app, "/netflix/speedtest/v2").await;
        assert_eq!(directory.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(directory).await).unwrap();
        assert_eq!(json["client"]["ip"], "198.51.100.4:40000");

        let telemetry = send(&app, Method::POST, "/telemetry/cl2", Body::from("{}")).await;
        assert_eq!(telemetry.status(), StatusCode::OK);
        assert_eq!(telemetry.headers().get("X-Frame-Options").unwrap(), "DENY");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let root = temp_root("methods");
        let app = app(&root);

        for (method, uri) in [
            (Method::PUT, "/speedtest"),
            (Method::DELETE, "/speedtest/range/0-9"),
            (Method::GET, "/telemetry/cl2"),
            (Method::POST, "/netflix/speedtest/v2"),
            (Method::POST, "/index.html"),
            (Method::OPTIONS, "/speedtest"),
        ] {
            let response = send(&app, method.clone(), uri, Body::empty()).await;
            assert_eq!(
                response.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{} {}",
                method,
                uri
            );
        }

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_preflight_has_no_content_length() {
        let root = temp_root("preflight");
        let app = app(&root);

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/speedtest/range/0-1023")
            .header(header::ORIGIN, "http://client.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_static_files() {
        let root = temp_root("static");
        let app = app(&root);

        let index = get_path(&app, "/").await;
        assert_eq!(index.status(), StatusCode::OK);
        assert!(index
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert_eq!(body_bytes(index).await, b"<html>hi</html>");

        let asset = get_path(&app, "/assets/app.js").await;
        assert_eq!(asset.status(), StatusCode::OK);
        assert!(asset
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("javascript"));

        let spaced = get_path(&app, "/a%20b.txt").await;
        assert_eq!(body_bytes(spaced).await, b"spaced");

        let nested = get_path(&app, "/sub/").await;
        assert_eq!(body_bytes(nested).await, b"<html>sub</html>");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let root = temp_root("redirect");
        let app = app(&root);

        let response = get_path(&app, "/sub").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/sub/");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_missing_and_traversal_are_not_found() {
        let root = temp_root("missing");
        let app = app(&root);

        for uri in [
            "/nope.css",
            "/../../etc/passwd",
            "/assets/%2e%2e/%2e%2e/secret",
            "/assets/",
        ] {
            assert_eq!(get_path(&app, uri).await.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_permanent_redirect_only_rewrites_temporary() {
        let redirect = Response::builder()
            .status(StatusCode::TEMPORARY_REDIRECT)
            .body(())
            .unwrap();
        assert_eq!(permanent_redirect(redirect).status(), StatusCode::MOVED_PERMANENTLY);

        let ok = Response::builder().status(StatusCode::OK).body(()).unwrap();
        assert_eq!(permanent_redirect(ok).status(), StatusCode::OK);
    }
}
