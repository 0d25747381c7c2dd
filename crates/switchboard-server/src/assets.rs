//! Static client files.

use std::path::Path;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

/// Browser client served at `/`.
pub const CLIENT_HTML: &str = "client.html";
/// Script served at `/client.js`.
pub const CLIENT_JS: &str = "client.js";

fn content_type(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Serve `name` from `dir`.
///
/// A missing or unreadable file answers `204 No Content`.
pub async fn serve_file(dir: &Path, name: &str) -> Response {
    let path = dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type(name))], body).into_response(),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), "static file not found");
            } else {
                warn!(path = %path.display(), error = %err, "failed to read static file");
            }
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type("client.html"), "text/html; charset=utf-8");
        assert_eq!(content_type("client.js"), "text/javascript; charset=utf-8");
        assert_eq!(content_type("blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLIENT_JS), "console.log(1);").unwrap();
        let resp = serve_file(dir.path(), CLIENT_JS).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/javascript; charset=utf-8"
        );
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"console.log(1);");
    }

    #[tokio::test]
    async fn missing_file_is_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let resp = serve_file(dir.path(), CLIENT_HTML).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
