//! Upload-and-poll against a mocked Notion file-upload API

mod common;

use common::{fast_executor, fast_upload};
use notesync::note::Note;
use notesync::notion::{ExportOptions, NotionPageEndpoint, NotionUploadEndpoint, image_blocks};
use notesync::{AsyncJobPoller, Error, JobState, PermanentHandle};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn poller(server: &MockServer, max_poll_attempts: u32) -> AsyncJobPoller {
    let endpoint = NotionUploadEndpoint::with_client(reqwest::Client::new(), "secret")
        .with_base_url(server.uri());
    AsyncJobPoller::new(
        Arc::new(endpoint),
        fast_executor(),
        fast_upload(max_poll_attempts),
    )
}

async fn mount_start(server: &MockServer, external_url: &str, id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .and(body_partial_json(json!({ "external_url": external_url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/file_uploads/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn requests_to(requests: &[wiremock::Request], verb: &str) -> usize {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb)
        .count()
}

#[tokio::test]
async fn upload_completes_after_pending_polls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .and(header("Authorization", "Bearer secret"))
        .and(header("Notion-Version", "2022-06-28"))
        .and(body_partial_json(json!({
            "mode": "external_url",
            "filename": "image.jpeg",
            "external_url": "https://img.example.com/a.png",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "fu_1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/file_uploads/fu_1"))
        .and(header("Notion-Version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_status(&server, "fu_1", json!({ "status": "uploaded" })).await;

    let handle = poller(&server, 30)
        .run("http://img.example.com/a.png")
        .await
        .unwrap();

    assert_eq!(handle, PermanentHandle("fu_1".into()));
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_to(&requests, "POST"), 1);
    assert_eq!(requests_to(&requests, "GET"), 3);
}

#[tokio::test]
async fn server_side_failure_reports_reason() {
    let server = MockServer::start().await;
    mount_start(&server, "https://img.example.com/bad.tiff", "fu_bad").await;
    mount_status(
        &server,
        "fu_bad",
        json!({
            "status": "failed",
            "file_import_result": { "error": { "message": "Unsupported file type" } }
        }),
    )
    .await;

    let err = poller(&server, 30)
        .run("https://img.example.com/bad.tiff")
        .await
        .unwrap_err();

    match err {
        Error::JobFailed { job_id, reason } => {
            assert_eq!(job_id, "fu_bad");
            assert_eq!(reason, "Unsupported file type");
        }
        other => panic!("expected JobFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn job_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    mount_start(&server, "https://img.example.com/slow.png", "fu_slow").await;
    mount_status(&server, "fu_slow", json!({ "status": "pending" })).await;

    let err = poller(&server, 4)
        .run("https://img.example.com/slow.png")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::JobTimedOut { attempts: 4, .. }));
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_to(&requests, "GET"), 4);
}

#[tokio::test]
async fn rate_limited_start_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_start(&server, "https://img.example.com/a.png", "fu_2").await;
    mount_status(&server, "fu_2", json!({ "status": "uploaded" })).await;

    let handle = poller(&server, 30)
        .run("https://img.example.com/a.png")
        .await
        .unwrap();

    assert_eq!(handle.0, "fu_2");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests_to(&requests, "POST"), 2);
}

#[tokio::test]
async fn rejected_start_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "code": "validation_error",
            "message": "Invalid external URL"
        })))
        .mount(&server)
        .await;

    let err = poller(&server, 30)
        .run("https://img.example.com/a.png")
        .await
        .unwrap_err();

    match err {
        Error::PermanentRequest { status, message } => {
            assert_eq!(status, Some(400));
            assert!(message.contains("Invalid external URL"), "{message}");
        }
        other => panic!("expected PermanentRequest, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn start_response_without_id_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "file_upload" })))
        .mount(&server)
        .await;

    let err = poller(&server, 30)
        .run("https://img.example.com/a.png")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PermanentRequest { status: None, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_isolates_failures_and_keeps_order() {
    let server = MockServer::start().await;
    for (name, id) in [("a", "fu_a"), ("b", "fu_b"), ("c", "fu_c"), ("d", "fu_d")] {
        mount_start(&server, &format!("https://img.example.com/{name}.png"), id).await;
    }
    mount_status(&server, "fu_a", json!({ "status": "uploaded" })).await;
    mount_status(
        &server,
        "fu_b",
        json!({ "status": "failed", "file_import_result": { "error": { "message": "too large" } } }),
    )
    .await;
    mount_status(&server, "fu_c", json!({ "status": "uploaded" })).await;
    mount_status(&server, "fu_d", json!({ "status": "uploaded" })).await;

    let sources: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| format!("http://img.example.com/{n}.png"))
        .collect();
    let report = poller(&server, 30).run_batch(&sources).await;

    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[1].job.state, JobState::Failed);
    assert_eq!(
        report.outcomes[1].job.last_error.as_deref(),
        Some("too large")
    );

    let blocks = image_blocks(report.handles());
    let ids: Vec<_> = blocks
        .iter()
        .map(|b| b["image"]["file_upload"]["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["fu_a", "fu_c", "fu_d"]);
}

fn gallery_note() -> Note {
    let image = |name: &str| {
        json!({ "url_default": format!("http://sns-webpic.example.com/202401/abc/notes/{name}!nd_dft_wlteh_webp_3") })
    };
    Note::from_note_card(
        &json!({
            "type": "video",
            "title": "Harbour walk",
            "desc": "Evening by the water",
            "user": { "nickname": "walker", "user_id": "u7", "xsec_token": "t" },
            "interact_info": { "liked_count": "12", "collected_count": "3" },
            "tag_list": [{ "name": "sea" }],
            "image_list": [image("a"), image("b"), image("c")],
            "video": { "media": { "stream": { "h264": [{ "master_url": "https://video.example.com/w.mp4" }] } } }
        }),
        "https://www.example.com/explore/n1",
    )
    .unwrap()
}

async fn mount_gallery_uploads(server: &MockServer) {
    for name in ["a", "b", "c"] {
        mount_start(
            server,
            &format!("https://ci.xiaohongshu.com/notes/{name}?imageView2/format/png"),
            &format!("fu_{name}"),
        )
        .await;
    }
    mount_status(server, "fu_a", json!({ "status": "uploaded" })).await;
    mount_status(
        server,
        "fu_b",
        json!({ "status": "failed", "file_import_result": { "error": { "message": "too large" } } }),
    )
    .await;
    mount_status(server, "fu_c", json!({ "status": "uploaded" })).await;
}

fn page_endpoint(server: &MockServer) -> NotionPageEndpoint {
    NotionPageEndpoint::with_client(reqwest::Client::new(), "secret", "db_1").with_base_url(server.uri())
}

fn page_requests(requests: &[wiremock::Request]) -> Vec<serde_json::Value> {
    requests
        .iter()
        .filter(|r| r.url.path() == "/v1/pages")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn exported_page_shows_uploaded_images_in_order() {
    let server = MockServer::start().await;
    mount_gallery_uploads(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(header("Authorization", "Bearer secret"))
        .and(header("Notion-Version", "2022-06-28"))
        .and(body_partial_json(json!({ "parent": { "database_id": "db_1" } })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "page_1", "url": "https://www.notion.so/page_1" })),
        )
        .mount(&server)
        .await;

    let export = page_endpoint(&server)
        .export_note(&poller(&server, 30), &gallery_note(), &ExportOptions::default())
        .await
        .unwrap();

    assert_eq!(export.page.id, "page_1");
    assert_eq!(export.page.url.as_deref(), Some("https://www.notion.so/page_1"));
    assert_eq!(export.uploads.succeeded(), 2);
    assert_eq!(export.uploads.failed(), 1);

    let requests = server.received_requests().await.unwrap();
    let pages = page_requests(&requests);
    assert_eq!(pages.len(), 1);
    let body = &pages[0];

    let children = body["children"].as_array().unwrap();
    let kinds: Vec<_> = children.iter().map(|b| b["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["callout", "image", "image", "embed"]);
    assert_eq!(children[1]["image"]["file_upload"]["id"], "fu_a");
    assert_eq!(children[2]["image"]["file_upload"]["id"], "fu_c");
    assert_eq!(children[3]["embed"]["url"], "https://video.example.com/w.mp4");

    assert_eq!(body["cover"]["type"], "external");
    assert_eq!(
        body["cover"]["external"]["url"],
        "https://sns-webpic.example.com/202401/abc/notes/a!nd_dft_wlteh_webp_3"
    );
    assert_eq!(body["properties"]["笔记标题"]["title"][0]["text"]["content"], "Harbour walk");
    assert_eq!(body["properties"]["点赞数"]["number"], 12);
    assert_eq!(
        body["properties"]["作者主页"]["url"],
        "https://www.xiaohongshu.com/user/profile/u7?xsec_token=t"
    );
}

#[tokio::test]
async fn page_creation_is_retried_and_rejection_surfaces() {
    let server = MockServer::start().await;
    mount_gallery_uploads(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "code": "validation_error",
            "message": "笔记标题 is not a property that exists."
        })))
        .mount(&server)
        .await;

    let err = page_endpoint(&server)
        .export_note(&poller(&server, 30), &gallery_note(), &ExportOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::PermanentRequest { status, message } => {
            assert_eq!(status, Some(400));
            assert!(message.contains("is not a property"), "{message}");
        }
        other => panic!("expected PermanentRequest, got {other:?}"),
    }
    let requests = server.received_requests().await.unwrap();
    assert_eq!(page_requests(&requests).len(), 2);
}
