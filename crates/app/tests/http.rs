use std::fs;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use cabinet_api::{CabinetApi, MockApi};
use cabinet_app::router;
use cabinet_core::Session;
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

const BOUNDARY: &str = "cabinet-test-boundary";

fn app_with(api: Arc<dyn CabinetApi>, files: &std::path::Path) -> Router {
    router(api, files, 1024 * 1024)
}

fn sessions() -> Vec<Session> {
    let t = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
    let mut a = Session::provisional(0, t, t);
    a.size_human = "1.5 KiB".into();
    let mut b = Session::provisional(2, t, t);
    b.has_report = true;
    vec![a, b]
}

fn multipart(parts: &[(&str, &str)]) -> Body {
    let mut body = String::new();
    for (name, content) in parts {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn upload(uri: &str, parts: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(parts))
        .unwrap()
}

async fn json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn lists_sessions_newest_first() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app_with(Arc::new(MockApi::with_sessions(sessions())), tmp.path());
    let resp = app.oneshot(Request::get("/api/v1/logs").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json(resp).await;
    assert_eq!(v[0]["id"], 2);
    assert_eq!(v[0]["hasReport"], true);
    assert_eq!(v[1]["sizeHuman"], "1.5 KiB");
    assert_eq!(v[1]["createdAt"], 1_650_000_000i64);
}

#[tokio::test]
async fn get_by_id_status_codes() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app_with(Arc::new(MockApi::with_sessions(sessions())), tmp.path());

    let ok = app.clone().oneshot(Request::get("/api/v1/logs/2").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(json(ok).await["id"], 2);

    let missing = app.clone().oneshot(Request::get("/api/v1/logs/9").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let bad = app.oneshot(Request::get("/api/v1/logs/abc").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(bad).await["kind"], "validation");
}

#[tokio::test]
async fn upload_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let app = app_with(api.clone(), tmp.path());

    let no_date = app.clone().oneshot(upload("/api/v1/logs", &[("log", "hello")])).await.unwrap();
    assert_eq!(no_date.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(no_date).await["message"], "The 'date' parameter has not been set.");

    let no_log = app.clone().oneshot(upload("/api/v1/logs?date=1650000000", &[("stats", "0 a 1")])).await.unwrap();
    assert_eq!(no_log.status(), StatusCode::BAD_REQUEST);

    let unpaired = app.clone().oneshot(upload("/api/v1/logs?date=1650000000", &[("log", "x"), ("stats", "0 a 1")])).await.unwrap();
    assert_eq!(unpaired.status(), StatusCode::BAD_REQUEST);
    assert!(api.uploads.lock().unwrap().is_empty());

    let ok = app
        .oneshot(upload("/api/v1/logs?date=1650000000", &[("log", "x"), ("stats", "0 a 1"), ("stats_map", "{\"a\":\"A\"}")]))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let v = json(ok).await;
    assert_eq!(v["id"], 0);
    assert_eq!(v["createdAt"], 1_650_000_000i64);
    assert!(v.get("sizeHuman").is_none());
    assert_eq!(api.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn serves_session_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("0")).unwrap();
    fs::write(tmp.path().join("0").join("0.txt"), "raw log").unwrap();
    let app = app_with(Arc::new(MockApi::new()), tmp.path());

    let resp = app.clone().oneshot(Request::get("/files/0/0.txt").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"raw log");

    let missing = app.oneshot(Request::get("/files/0/0.zip").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
