//! HTTP routes, driven through the router without a socket.

#![cfg(feature = "server")]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{FakePlatform, FakeVideo, JSON3_HELLO};
use pagewise::server::{build_router, AppState, SubtitleResponse};
use pagewise::stream::JobEvent;
use pagewise::SubtitleConfig;
use std::sync::Arc;
use tower::ServiceExt;

fn state(videos: Vec<FakeVideo>, scratch: &std::path::Path) -> AppState {
    AppState {
        platform: Arc::new(FakePlatform::new(videos)),
        config: SubtitleConfig {
            scratch_root: Some(scratch.to_path_buf()),
            ..SubtitleConfig::default()
        },
    }
}

fn post_json(uri: &str, url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "url": url }).to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn root_and_health() {
    let scratch = tempfile::tempdir().unwrap();
    let app = build_router(state(Vec::new(), scratch.path()));

    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(value["status"].is_string());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn ndjson_feed_ends_with_complete() {
    let scratch = tempfile::tempdir().unwrap();
    let app = build_router(state(
        vec![
            FakeVideo::with_json3("a1", "One", JSON3_HELLO),
            FakeVideo::without_captions("b2", "Two"),
        ],
        scratch.path(),
    ));

    let response = app
        .oneshot(post_json(
            "/api/youtube-subtitles",
            "https://video.test/playlist?list=PL1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-ndjson"
    );

    let body = body_string(response).await;
    let events: Vec<JobEvent> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(matches!(&events[0], JobEvent::Progress { total: 2, .. }));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(
        events.last(),
        Some(JobEvent::Complete { video_count: 2, success: true, .. })
    ));
}

#[tokio::test]
async fn ndjson_feed_reports_bad_url_in_band() {
    let scratch = tempfile::tempdir().unwrap();
    let app = build_router(state(Vec::new(), scratch.path()));
    let response = app
        .oneshot(post_json("/api/youtube-subtitles", "ftp://nowhere"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    let event: JobEvent = serde_json::from_str(body.trim_end()).unwrap();
    assert!(matches!(event, JobEvent::Error { .. }));
}

#[tokio::test]
async fn single_result_route() {
    let scratch = tempfile::tempdir().unwrap();
    let app = build_router(state(
        vec![FakeVideo::with_json3("a1", "One", JSON3_HELLO)],
        scratch.path(),
    ));
    let response = app
        .oneshot(post_json("/api/subtitles", "https://video.test/watch?v=a1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: SubtitleResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(result.success);
    assert_eq!(result.title, "One");
    assert_eq!(result.video_count, 1);
    assert!(result.text.contains("hello world it's fine"));
}

#[tokio::test]
async fn single_result_status_codes() {
    let scratch = tempfile::tempdir().unwrap();

    let app = build_router(state(Vec::new(), scratch.path()));
    let response = app
        .oneshot(post_json("/api/subtitles", "not a url"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(value["success"], false);

    // The fake cannot resolve anything when it has no videos.
    let app = build_router(state(Vec::new(), scratch.path()));
    let response = app
        .oneshot(post_json("/api/subtitles", "https://video.test/watch?v=x"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let app = build_router(state(
        vec![FakeVideo::without_captions("b2", "Silent")],
        scratch.path(),
    ));
    let response = app
        .oneshot(post_json("/api/subtitles", "https://video.test/watch?v=b2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shared_cancel_flag_does_not_reach_requests() {
    let scratch = tempfile::tempdir().unwrap();
    let mut app_state = state(
        vec![FakeVideo::with_json3("a1", "One", JSON3_HELLO)],
        scratch.path(),
    );
    let flag = pagewise::CancelFlag::new();
    flag.cancel();
    app_state.config.cancel = Some(flag);
    let app = build_router(app_state);

    let response = app
        .clone()
        .oneshot(post_json("/api/subtitles", "https://video.test/watch?v=a1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json("/api/youtube-subtitles", "https://video.test/watch?v=a1"))
        .await
        .unwrap();
    let body = body_string(response).await;
    let last: JobEvent = serde_json::from_str(body.lines().last().unwrap()).unwrap();
    assert!(matches!(last, JobEvent::Complete { video_count: 1, .. }));
}
