//! Daily report: prompt assembly, generation, commit and the stored record
//! that feeds the RSS channel.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use aidigest_providers::ChatClient;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::StreamExt;
use pulldown_cmark::{Options, Parser, html};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::date::FetchDate;
use crate::github::GitHubClient;
use crate::kv::{KvStore, put_json, report_key};
use crate::sources::{Category, UnifiedItem};
use crate::text::{
    from_chinese_quotes, remove_markdown_code_block, replace_image_proxy, to_chinese_quotes,
};

/// Built-in report instructions, used when no prompt file is configured.
pub const DEFAULT_PROMPT: &str = "\
你是一名 AI 行业编辑。请根据下面列出的资讯，撰写一份简洁的中文日报（Markdown 格式）。
要求：
- 按主题分组，每组使用三级标题；
- 每条资讯用一到两句话概括要点，并保留原文链接；
- 不要编造列表之外的内容，不要输出 Markdown 以外的说明文字。";

/// Picks items by `type:id` handle.
///
/// An empty selection keeps every stored item, so `generate` without `--ids`
/// summarizes the whole day. A selection that matches nothing yields an
/// empty list, which callers reject.
pub fn select_items(
    all: &BTreeMap<Category, Vec<UnifiedItem>>,
    selection: &[String],
) -> Vec<UnifiedItem> {
    let items = all.values().flatten();
    if selection.is_empty() {
        return items.cloned().collect();
    }
    items
        .filter(|item| selection.iter().any(|s| s.trim() == item.selection_key()))
        .cloned()
        .collect()
}

/// Appends the selected items, numbered, to the report instructions.
pub fn build_prompt(items: &[UnifiedItem], template: &str) -> String {
    let mut prompt = template.trim().to_string();
    prompt.push_str("\n\n");
    for (index, item) in items.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{}] {}",
            index + 1,
            item.kind.display_name(),
            item.title.trim()
        );
        if !item.source.is_empty() {
            let _ = writeln!(prompt, "   来源: {}", item.source);
        }
        if !item.url.is_empty() {
            let _ = writeln!(prompt, "   链接: {}", item.url);
        }
        let description = item.description.trim();
        if !description.is_empty() {
            let _ = writeln!(prompt, "   {description}");
        }
    }
    prompt
}

/// Asks the model for the report body.
///
/// With `stream`, fragments are passed to `on_fragment` as they arrive. The
/// returned markdown has fences stripped and quotes converted.
pub async fn generate_daily<F>(
    client: &ChatClient,
    prompt: &str,
    stream: bool,
    mut on_fragment: F,
) -> Result<String>
where
    F: FnMut(&str),
{
    debug!(chars = prompt.chars().count(), stream, "Generating daily report");
    let raw = if stream {
        let mut fragments = client.generate_stream(prompt, None).await?;
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            text.push_str(&fragment);
        }
        text
    } else {
        client.generate(prompt, None).await?
    };
    Ok(to_chinese_quotes(&remove_markdown_code_block(&raw)))
}

/// Adds the `## title date` header and the subtitle quote.
pub fn compose_daily_markdown(
    title: &str,
    subtitle: &str,
    date: FetchDate,
    body: &str,
) -> String {
    let mut markdown = format!("## {} {}\n\n", title.trim(), date.to_chinese());
    if !subtitle.trim().is_empty() {
        let _ = write!(markdown, "> {}\n\n", subtitle.trim());
    }
    markdown.push_str(body.trim());
    markdown.push('\n');
    markdown
}

pub fn daily_path(date: FetchDate) -> String {
    format!("daily/{date}.md")
}

/// Result of [`commit_daily`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub path: String,
    pub created: bool,
}

/// Creates or updates `daily/{date}.md`.
pub async fn commit_daily(
    github: &GitHubClient,
    date: FetchDate,
    markdown: &str,
) -> Result<CommitOutcome> {
    if markdown.trim().is_empty() {
        bail!("No markdown content provided for GitHub commit.");
    }
    let path = daily_path(date);
    let sha = github.file_sha(&path).await?;
    let verb = if sha.is_some() { "Update" } else { "Create" };
    let message = format!("{verb} daily summary file for {date}");

    github
        .put_file(&path, &from_chinese_quotes(markdown), &message, sha.as_deref())
        .await?;
    info!(%path, created = sha.is_none(), "Daily report committed");
    Ok(CommitOutcome {
        created: sha.is_none(),
        path,
    })
}

/// Rendered report as stored for the RSS channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub report_date: String,
    pub title: String,
    /// Site-relative link to the report page.
    pub link: String,
    pub content_html: String,
    /// When the record was produced (RFC 3339, UTC).
    pub published_date: String,
}

/// CommonMark (plus tables and strikethrough) to HTML.
pub fn render_commonmark(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

pub fn build_report_record(
    markdown: &str,
    date: FetchDate,
    image_proxy: &str,
    now: DateTime<Utc>,
) -> ReportRecord {
    ReportRecord {
        report_date: date.to_string(),
        title: format!("{date}日刊"),
        link: format!("/daily/{date}.html"),
        content_html: render_commonmark(&replace_image_proxy(image_proxy, markdown)),
        published_date: now.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Reads the committed report, renders it and stores it under `{date}-report`.
pub async fn write_rss_data(
    github: &GitHubClient,
    store: &dyn KvStore,
    date: FetchDate,
    image_proxy: &str,
    ttl: Duration,
) -> Result<ReportRecord> {
    let path = daily_path(date);
    let markdown = github
        .read_file(&path)
        .await
        .with_context(|| format!("Failed to read {path} from GitHub"))?;
    if markdown.trim().is_empty() {
        bail!("No content found for {path}");
    }
    let record = build_report_record(&markdown, date, image_proxy, Utc::now());
    put_json(store, &report_key(date), &record, ttl)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use aidigest_providers::{ChatConfig, Provider};
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::github::GitHubSettings;
    use crate::kv::{DEFAULT_TTL, MemoryKvStore, get_json};
    use crate::sources::tests::item;

    fn date() -> FetchDate {
        "2025-06-01".parse().unwrap()
    }

    fn github(server: &MockServer) -> GitHubClient {
        GitHubClient::new(GitHubSettings {
            api_url: server.uri(),
            token: "t".to_string(),
            owner: "o".to_string(),
            repo: "r".to_string(),
            branch: "main".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_select_items() {
        let mut all = BTreeMap::new();
        all.insert(
            Category::News,
            vec![item(Category::News, "1", ""), item(Category::News, "2", "")],
        );
        all.insert(Category::Paper, vec![item(Category::Paper, "1", "")]);

        assert_eq!(select_items(&all, &[]).len(), 3);
        let picked = select_items(&all, &["paper:1".to_string(), " news:2 ".to_string()]);
        let keys: Vec<String> = picked.iter().map(UnifiedItem::selection_key).collect();
        assert_eq!(keys, ["news:2", "paper:1"]);
        assert!(select_items(&all, &["news:99".to_string()]).is_empty());
    }

    #[test]
    fn test_build_prompt_numbers_items() {
        let items = vec![item(Category::News, "1", ""), item(Category::Project, "2", "")];
        let prompt = build_prompt(&items, "  Write a digest.  ");
        assert!(prompt.starts_with("Write a digest.\n\n1. [新闻] Title 1\n   来源: test\n"));
        assert!(prompt.contains("2. [项目] Title 2\n   来源: test\n   链接: https://example.com/2\n   Description 2\n"));
    }

    #[test]
    fn test_compose_daily_markdown() {
        assert_eq!(
            compose_daily_markdown("AI洞察日报", "每日精选", date(), "\n### 要闻\n- a\n"),
            "## AI洞察日报 2025年6月1日\n\n> 每日精选\n\n### 要闻\n- a\n"
        );
        assert_eq!(
            compose_daily_markdown("T", " ", date(), "body"),
            "## T 2025年6月1日\n\nbody\n"
        );
    }

    #[test]
    fn test_build_report_record() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let record = build_report_record(
            "# Hi\n\n![x](https://upload.chinaz.com/a.png)",
            date(),
            "https://img.proxy/?",
            now,
        );
        assert_eq!(record.title, "2025-06-01日刊");
        assert_eq!(record.link, "/daily/2025-06-01.html");
        assert_eq!(record.published_date, "2025-06-01T02:00:00Z");
        assert!(record.content_html.starts_with("<h1>Hi</h1>"));
        assert!(
            record
                .content_html
                .contains("src=\"https://img.proxy/?https://pic.chinaz.com/a.png\"")
        );
    }

    #[tokio::test]
    async fn test_generate_daily_cleans_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "```\n### 今日\n他说\"你好\"\n```"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;
        let client =
            ChatClient::new(ChatConfig::new(Provider::Gemini, server.uri(), "k", "m")).unwrap();

        let body = generate_daily(&client, "prompt", false, |_| {}).await.unwrap();
        assert_eq!(body, "### 今日\n他说“你好“");
    }

    #[tokio::test]
    async fn test_generate_daily_streams_fragments() {
        let server = MockServer::start().await;
        let sse = [
            r###"data: {"choices":[{"delta":{"content":"## A"}}]}"###,
            r#"data: {"choices":[{"delta":{"content":"I"}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n");
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;
        let client =
            ChatClient::new(ChatConfig::new(Provider::OpenAI, server.uri(), "k", "m")).unwrap();

        let mut seen = Vec::new();
        let body = generate_daily(&client, "prompt", true, |f| seen.push(f.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, ["## A", "I"]);
        assert_eq!(body, "## AI");
    }

    /// Test: an existing file is updated with its SHA and quotes restored.
    #[tokio::test]
    async fn test_commit_daily_updates_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/daily/2025-06-01.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "s1"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/o/r/contents/daily/2025-06-01.md"))
            .and(body_partial_json(json!({
                "message": "Update daily summary file for 2025-06-01",
                "sha": "s1",
                // "say \"hi\""
                "content": "c2F5ICJoaSI=",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = commit_daily(&github(&server), date(), "say “hi”").await.unwrap();
        assert_eq!(
            outcome,
            CommitOutcome {
                path: "daily/2025-06-01.md".to_string(),
                created: false
            }
        );
    }

    #[tokio::test]
    async fn test_commit_daily_creates_and_rejects_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(body_partial_json(json!({"message": "Create daily summary file for 2025-06-01"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = github(&server);
        assert!(commit_daily(&client, date(), "x").await.unwrap().created);
        assert!(commit_daily(&client, date(), "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_write_rss_data_stores_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/daily/2025-06-01.md"))
            // "# 今日"
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "IyDku4rml6U="})))
            .mount(&server)
            .await;

        let store = MemoryKvStore::new();
        let record = write_rss_data(&github(&server), &store, date(), "", DEFAULT_TTL)
            .await
            .unwrap();
        assert_eq!(record.content_html, "<h1>今日</h1>\n");

        let stored: ReportRecord = get_json(&store, "2025-06-01-report").unwrap().unwrap();
        assert_eq!(stored, record);
    }
}
