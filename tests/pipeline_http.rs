//! End-to-end pipeline tests over real HTTP against a mock GitLab instance

use gitlab_dl::{Config, GitLabApi, MetadataRecord, RetryConfig, SearchDownloader};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_hit(project_id: i64, file: &str) -> serde_json::Value {
    serde_json::json!({
        "project_id": project_id,
        "path": file,
        "filename": file,
        "ref": "main",
        "data": "matched line",
        "startline": 3,
    })
}

fn project_payload(id: i64, path: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "path_with_namespace": path,
        "default_branch": "main",
    })
}

async fn downloader_for(server: &MockServer, output_dir: &TempDir) -> SearchDownloader {
    let mut config = Config::new("gitlab.test", "needle");
    config.output_dir = output_dir.path().to_path_buf();
    config.workers = 4;
    config.retry = RetryConfig {
        max_retries: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let base = Url::parse(&format!("{}/api/v4/", server.uri())).unwrap();
    let api = Arc::new(GitLabApi::from_base_url(base, Some("test-token".to_string())).unwrap());
    SearchDownloader::new(config, api).await.unwrap()
}

#[tokio::test]
async fn full_run_downloads_search_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .and(query_param("scope", "blobs"))
        .and(query_param("search", "needle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            search_hit(1, "src/widget.rs"),
            search_hit(2, "README.md"),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_payload(1, "group/widgets")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_payload(2, "group/docs")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/1/repository/files/src%2Fwidget.rs/raw"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pub struct Widget;".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/2/repository/files/README.md/raw"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"# Docs".to_vec()))
        .mount(&server)
        .await;

    let output_dir = TempDir::new().unwrap();
    let downloader = downloader_for(&server, &output_dir).await;
    let summary = downloader.run().await.unwrap();

    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 0);

    let widget = output_dir.path().join("group__widgets__src__widget.rs");
    assert_eq!(std::fs::read(widget).unwrap(), b"pub struct Widget;");

    let metadata: Vec<MetadataRecord> = serde_json::from_slice(
        &std::fs::read(output_dir.path().join(gitlab_dl::METADATA_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata.len(), 2);
}

#[tokio::test]
async fn rate_limited_download_retries_and_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(serde_json::json!([search_hit(5, "app.py")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_payload(5, "team/app")))
        .mount(&server)
        .await;

    // First file request is rate-limited with a short hint, then it succeeds
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/5/repository/files/app.py/raw"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/5/repository/files/app.py/raw"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"print('ok')".to_vec()))
        .mount(&server)
        .await;

    let output_dir = TempDir::new().unwrap();
    let downloader = downloader_for(&server, &output_dir).await;
    let summary = downloader.run().await.unwrap();

    assert_eq!(summary.success, 1);
    assert_eq!(summary.failed, 0);

    let log =
        std::fs::read_to_string(output_dir.path().join(gitlab_dl::ATTEMPT_LOG_FILE_NAME)).unwrap();
    let entry: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(entry["attempts"], 2);
    assert_eq!(entry["status"], "success");
}

#[tokio::test]
async fn second_run_over_same_directory_downloads_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(serde_json::json!([search_hit(7, "main.go")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_payload(7, "go/tool")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/7/repository/files/main.go/raw"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"package main".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let output_dir = TempDir::new().unwrap();

    let first = downloader_for(&server, &output_dir).await;
    assert_eq!(first.run().await.unwrap().success, 1);

    let second = downloader_for(&server, &output_dir).await;
    let summary = second.run().await.unwrap();
    assert_eq!(summary.success, 0);
    assert_eq!(summary.skipped, 1);

    // The expect(1) on the raw-file mock verifies no second fetch happened
    server.verify().await;
}
