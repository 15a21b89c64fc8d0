//! HTTP facade for batch document extraction.
//!
//! One endpoint does the real work: `POST /process_files_by_stream`
//! takes a multipart batch of files plus a JSON `params` field and
//! returns one extracted record per input with a companion error list.
//! A path-based variant exists for callers on the same host.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

/// Start the web server.
pub async fn serve(settings: Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings);
    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> axum::Router {
        create_router(AppState::new(Settings::default()))
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> (String, String) {
        let boundary = "docmill-test-boundary";
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{boundary}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    async fn post_stream(parts: &[(&str, Option<&str>, &str)]) -> (StatusCode, serde_json::Value) {
        let (content_type, body) = multipart_body(parts);
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/process_files_by_stream")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty_lists() {
        let (status, json) = post_stream(&[("params", None, "{}")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["extracted"].as_array().unwrap().len(), 0);
        assert_eq!(json["errors"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_extension_reported_not_failed() {
        let (status, json) = post_stream(&[
            ("pdfs", Some("missing.xyz"), "opaque-bytes"),
            ("params", None, "{}"),
        ])
        .await;
        assert_eq!(status, StatusCode::OK);
        let extracted = json["extracted"].as_array().unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(
            extracted[0]["metainfo"]["file_features"]["filename"],
            "missing.xyz"
        );
        let errors = json["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["kind"], "no_pipeline");
        assert_eq!(errors[0]["file"], "missing.xyz");
    }

    #[tokio::test]
    async fn test_duplicate_filenames_rejected() {
        let (status, _) = post_stream(&[
            ("pdfs", Some("a.pdf"), "x"),
            ("pdfs", Some("a.pdf"), "y"),
            ("params", None, "{}"),
        ])
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_perfile_key_rejected() {
        let (status, _) = post_stream(&[
            ("pdfs", Some("a.xyz"), "x"),
            (
                "params",
                None,
                r#"{"perfile_settings": {"other.pdf": {"lang": "de"}}}"#,
            ),
        ])
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_lang_rejected() {
        let (status, _) = post_stream(&[("params", None, r#"{"lang": "xx"}"#)]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_params_json_rejected() {
        let (status, _) = post_stream(&[("params", None, "not json")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_outcome_cardinality() {
        // Mixed unknown extensions: every input appears in extracted,
        // every failure appears exactly once in errors.
        let (status, json) = post_stream(&[
            ("pdfs", Some("one.xyz"), "1"),
            ("pdfs", Some("two.zzz"), "2"),
            ("params", None, "{}"),
        ])
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["extracted"].as_array().unwrap().len(), 2);
        assert_eq!(json["errors"].as_array().unwrap().len(), 2);
        let names: Vec<&str> = json["extracted"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["metainfo"]["file_features"]["filename"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["one.xyz", "two.zzz"]);
    }
}
