//! Upload, signed retrieval, and the operational endpoints.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, StatusCode};
use domains::{DomainError, MockMediaStorage};
use integration_tests::{TestApp, MEDIA_BASE_URL, MEDIA_SIGNING_KEY};
use secrecy::SecretString;
use serde_json::json;
use storage_adapters::LocalMediaStore;

/// Smallest byte run that still looks like a JPEG to a casual reader.
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9];

/// Turns an absolute link from the store into a router-relative URI.
fn local_path(url: &str) -> String {
    url.strip_prefix("http://forum.test").expect("link under the test host").to_string()
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("clock after epoch").as_secs() as i64
}

#[tokio::test]
async fn jpeg_upload_returns_a_working_link() {
    let app = TestApp::spawn().await;

    let (status, body) = app.upload("image", "cat.JPG", "image/jpeg", JPEG).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["size"], JPEG.len());

    let filename = body["filename"].as_str().expect("filename");
    assert!(filename.ends_with(".jpg"), "{filename}");
    let url = body["url"].as_str().expect("url");
    assert!(url.starts_with(&format!("{MEDIA_BASE_URL}/{filename}?")), "{url}");

    let (status, bytes) = app.get(&local_path(url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], JPEG);
}

#[tokio::test]
async fn served_type_is_the_validated_one_not_the_file_name() {
    let app = TestApp::spawn().await;
    let payload = b"<script>alert(document.cookie)</script>";

    let (status, body) = app.upload("image", "evil.html", "image/png", payload).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let filename = body["filename"].as_str().expect("filename");
    assert!(filename.ends_with(".png"), "{filename}");

    let (status, headers, bytes) = app.fetch(&local_path(body["url"].as_str().expect("url"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()), Some("image/png"));
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).and_then(|v| v.to_str().ok()), Some("nosniff"));
    assert_eq!(&bytes[..], payload);
}

#[tokio::test]
async fn jpeg_is_served_as_jpeg() {
    let app = TestApp::spawn().await;
    let (_, body) = app.upload("image", "cat.jpeg", "image/jpg", JPEG).await;
    let (status, headers, _) = app.fetch(&local_path(body["url"].as_str().expect("url"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()), Some("image/jpeg"));
}

fn failing_store(err: DomainError) -> Arc<MockMediaStorage> {
    let mut store = MockMediaStorage::new();
    store.expect_put_object().times(1).returning(move |_, _, _| Err(err.clone()));
    store.expect_presigned_url().never();
    Arc::new(store)
}

#[tokio::test]
async fn storage_failure_is_a_generic_server_error() {
    let cases = [
        (DomainError::Internal("disk full at /var/lib/forum/media".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (DomainError::Unavailable("connection refused by 10.0.0.7:9000".into()), StatusCode::SERVICE_UNAVAILABLE),
    ];
    for (err, expected) in cases {
        let app = TestApp::with_media_store(failing_store(err)).await;

        let (status, body) = app.upload("image", "cat.jpg", "image/jpeg", JPEG).await;
        assert_eq!(status, expected);
        assert_eq!(body, json!({ "error": "Upload failed" }));
        let text = body.to_string();
        assert!(!text.contains("/var/lib") && !text.contains("10.0.0.7"), "{text}");
    }
}

#[tokio::test]
async fn validation_failure_never_reaches_a_failing_store() {
    let mut store = MockMediaStorage::new();
    store.expect_put_object().never();
    store.expect_presigned_url().never();
    let app = TestApp::with_media_store(Arc::new(store)).await;

    let (status, body) = app.upload("image", "notes.txt", "text/plain", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid file type" }));
}

#[tokio::test]
async fn png_upload_is_accepted() {
    let app = TestApp::spawn().await;
    let (status, body) = app.upload("image", "diagram.png", "image/png", b"\x89PNG\r\n\x1a\n").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["filename"].as_str().expect("filename").ends_with(".png"));
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, body) = app.upload("image", "notes.txt", "text/plain", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid file type" }));
}

#[tokio::test]
async fn missing_image_field_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, body) = app.upload("file", "cat.jpg", "image/jpeg", JPEG).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn empty_image_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, _) = app.upload("image", "cat.jpg", "image/jpeg", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tampered_or_unsigned_links_are_forbidden() {
    let app = TestApp::spawn().await;
    let (_, body) = app.upload("image", "cat.jpg", "image/jpeg", JPEG).await;
    let filename = body["filename"].as_str().expect("filename");
    let path = local_path(body["url"].as_str().expect("url"));

    let (base, query) = path.split_once('?').expect("signed query");
    let tampered = format!("{base}?{}", query.replace("signature=", "signature=00"));
    assert_eq!(app.get(&tampered).await.0, StatusCode::FORBIDDEN);

    let unsigned = format!("/api/v1/media/{filename}");
    assert_eq!(app.get(&unsigned).await.0, StatusCode::FORBIDDEN);

    // A valid signature does not carry over to another object.
    let (_, other) = app.upload("image", "dog.jpg", "image/jpeg", JPEG).await;
    let other = other["filename"].as_str().expect("filename");
    let swapped = format!("/api/v1/media/{other}?{query}");
    assert_eq!(app.get(&swapped).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_link_is_forbidden_and_unknown_object_is_not_found() {
    let app = TestApp::spawn().await;
    let scratch = tempfile::tempdir().expect("temp dir");
    let signer = LocalMediaStore::new(
        scratch.path().to_path_buf(),
        MEDIA_BASE_URL,
        SecretString::from(MEDIA_SIGNING_KEY.to_string()),
    );

    let (_, body) = app.upload("image", "cat.jpg", "image/jpeg", JPEG).await;
    let filename = body["filename"].as_str().expect("filename");
    let expired = now() - 60;
    let signature = signer.sign(filename, expired).expect("sign");
    let uri = format!("/api/v1/media/{filename}?expires={expired}&signature={signature}");
    assert_eq!(app.get(&uri).await.0, StatusCode::FORBIDDEN);

    let expires = now() + 3600;
    let signature = signer.sign("never-uploaded.jpg", expires).expect("sign");
    let uri = format!("/api/v1/media/never-uploaded.jpg?expires={expires}&signature={signature}");
    assert_eq!(app.get(&uri).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ping_answers() {
    let app = TestApp::spawn().await;
    let (status, _) = app.get("/api/v1/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_count_graph_operations_and_uploads() {
    let app = TestApp::spawn().await;
    app.data(r#"mutation { createBoard(input: { name: "metered" }) { id } }"#, json!({})).await;
    app.upload("image", "cat.jpg", "image/jpeg", JPEG).await;
    app.upload("image", "notes.txt", "text/plain", b"hello").await;

    let (status, body) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body.to_vec()).expect("utf-8 exposition");
    assert!(text.contains("forum_graph_operations_total"), "{text}");
    assert!(text.contains("operation=\"createBoard\""), "{text}");
    assert!(text.contains("forum_media_uploads_total"), "{text}");
    assert!(text.contains("outcome=\"invalid\""), "{text}");
}
