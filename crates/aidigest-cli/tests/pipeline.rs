use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Home with a config pointing Gemini at `gemini_url` and storage at `<home>/kv`.
fn setup_home(gemini_url: &str) -> TempDir {
    let dir = tempdir().unwrap();
    let storage = dir.path().join("kv");
    let config = format!(
        "platform = \"gemini\"\n\n[gemini]\napi_key = \"test-key\"\nbase_url = \"{gemini_url}\"\n\n[storage]\ndir = \"{}\"\n",
        storage.display()
    );
    fs::write(dir.path().join("config.toml"), config).unwrap();
    dir
}

/// Writes a stored entry the way the file store lays it out.
fn store_items(home: &Path, key: &str, items: &Value) {
    let storage = home.join("kv");
    fs::create_dir_all(&storage).unwrap();
    let envelope = json!({
        "expires_at": 4_102_444_800_u64,
        "value": items.to_string(),
    });
    fs::write(storage.join(format!("{key}.json")), envelope.to_string()).unwrap();
}

fn news_items() -> Value {
    json!([
        {
            "id": "1",
            "type": "news",
            "url": "https://news.example/a",
            "title": "Model released",
            "description": "A new model shipped",
            "published_date": "2025-06-01T02:00:00Z",
            "authors": "Alice",
            "source": "AI Base",
            "details": {}
        },
        {
            "id": "2",
            "type": "news",
            "url": "https://news.example/b",
            "title": "Benchmark results",
            "description": "Scores went up",
            "published_date": "2025-06-01T03:00:00Z",
            "authors": "Bob",
            "source": "AI Base",
            "details": {}
        }
    ])
}

#[test]
fn test_content_of_empty_store() {
    let home = setup_home("http://127.0.0.1:9");

    let output = cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .args(["content", "--date", "2025-06-01"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["date"], "2025-06-01");
    for category in ["news", "project", "paper", "socialMedia"] {
        assert_eq!(value[category], json!([]), "category {category}");
    }
}

#[test]
fn test_content_returns_stored_items() {
    let home = setup_home("http://127.0.0.1:9");
    store_items(home.path(), "2025-06-01-news", &news_items());

    let output = cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .args(["content", "--date", "2025-06-01"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["news"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["news"][0]["title"], "Model released");
    assert_eq!(value["paper"], json!([]));
}

#[test]
fn test_fetch_without_sources_fails() {
    let home = setup_home("http://127.0.0.1:9");

    cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .args(["fetch", "--date", "2025-06-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No sources configured"));
}

#[test]
fn test_generate_without_items_fails() {
    let home = setup_home("http://127.0.0.1:9");
    store_items(home.path(), "2025-06-01-news", &news_items());

    cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .args(["generate", "--date", "2025-06-01", "--ids", "news:99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No selected items for 2025-06-01"));
}

#[test]
fn test_commit_without_github_config_fails() {
    let home = setup_home("http://127.0.0.1:9");
    let report = home.path().join("daily.md");
    fs::write(&report, "## Daily\n").unwrap();

    cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .env_remove("GITHUB_TOKEN")
        .args(["commit", "--date", "2025-06-01"])
        .arg(&report)
        .assert()
        .failure()
        .stderr(predicate::str::contains("GitHub configuration is missing"));
}

#[test]
fn test_rss_with_no_reports_is_an_empty_channel() {
    let home = setup_home("http://127.0.0.1:9");

    cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .args(["rss", "--days", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<rss version=\"2.0\""))
        .stdout(predicate::str::contains("<title>AI洞察日报 RSS Feed</title>"))
        .stdout(predicate::str::contains("<item>").not());
}

/// Test: generate sends the selected items to the model and writes the
/// composed report.
#[tokio::test]
async fn test_generate_writes_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "```\n### 今日要闻\n- \"Model released\"\n```" }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = setup_home(&server.uri());
    store_items(home.path(), "2025-06-01-news", &news_items());
    let out = home.path().join("daily.md");

    cargo_bin_cmd!("aidigest")
        .env("AIDIGEST_HOME", home.path())
        .env_remove("GEMINI_API_URL")
        .args(["generate", "--date", "2025-06-01", "--ids", "news:1", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote"));

    let markdown = fs::read_to_string(&out).unwrap();
    assert!(markdown.starts_with("## AI洞察日报 2025年6月1日\n\n> 每日精选 AI 动态\n\n"));
    assert!(markdown.contains("### 今日要闻"));
    assert!(markdown.contains("“Model released“"));
    assert!(!markdown.contains("```"));
}
