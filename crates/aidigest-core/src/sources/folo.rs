//! Folo entries API: feeds and lists, paged with a `publishedAfter` cursor.

use aidigest_providers::{ChatClient, USER_AGENT};
use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Category, DataSource, FetchContext, UnifiedItem};
use crate::date::is_within_last_days;
use crate::text::strip_html;
use crate::translate::translate_texts;

const FOLO_ORIGIN: &str = "https://app.follow.is";

/// What to page through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoloTarget {
    Feed(String),
    List(String),
}

#[derive(Debug, Deserialize)]
struct EntriesPage {
    #[serde(default)]
    data: Vec<EntryEnvelope>,
}

#[derive(Debug, Deserialize)]
struct EntryEnvelope {
    entries: Entry,
    #[serde(default)]
    feeds: Option<Feed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    id: Value,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    title: Option<String>,
}

/// A Folo-backed source such as a news site or a curated list.
#[derive(Debug, Clone)]
pub struct FoloSource {
    id: String,
    name: String,
    category: Category,
    target: FoloTarget,
    view: u8,
    pages: u32,
    translate_titles: bool,
}

impl FoloSource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        target: FoloTarget,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            target,
            view: 1,
            pages: 3,
            translate_titles: false,
        }
    }

    /// Translate entry titles when the fetch context carries a translator.
    #[must_use]
    pub fn with_title_translation(mut self, enabled: bool) -> Self {
        self.translate_titles = enabled;
        self
    }

    #[must_use]
    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: u8) -> Self {
        self.view = view;
        self
    }

    fn request_body(&self, published_after: Option<&str>) -> Value {
        let mut body = match &self.target {
            FoloTarget::Feed(id) => json!({ "feedId": id }),
            FoloTarget::List(id) => json!({ "listId": id }),
        };
        body["view"] = json!(self.view);
        body["withContent"] = json!(true);
        if let Some(cursor) = published_after {
            body["publishedAfter"] = json!(cursor);
        }
        body
    }

    /// List entries are labelled with their originating feed.
    fn source_label(&self, feed: Option<&Feed>) -> String {
        match (&self.target, feed.and_then(|f| f.title.as_deref())) {
            (FoloTarget::List(_), Some(title)) if !title.trim().is_empty() => title.to_string(),
            _ => self.name.clone(),
        }
    }

    fn to_item(&self, envelope: EntryEnvelope) -> UnifiedItem {
        let source = self.source_label(envelope.feeds.as_ref());
        let entry = envelope.entries;
        let content = entry.content.unwrap_or_default();
        let id = match entry.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        UnifiedItem {
            id,
            kind: self.category,
            url: entry.url.unwrap_or_default(),
            title: entry.title.unwrap_or_default(),
            description: strip_html(&content),
            published_date: entry.published_at.unwrap_or_default(),
            authors: entry
                .author
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            source,
            details: json!({ "content_html": content }),
        }
    }

    async fn fetch_pages(&self, ctx: &FetchContext) -> Result<Vec<UnifiedItem>> {
        let api = ctx
            .folo
            .data_api
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .context("Folo data API is not configured. Set data_api in [folo].")?;

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for page in 1..=self.pages {
            let mut request = ctx
                .http
                .post(api)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .header(reqwest::header::ACCEPT, "application/json")
                .header(reqwest::header::ORIGIN, FOLO_ORIGIN)
                .header("x-app-name", "Folo Web")
                .json(&self.request_body(cursor.as_deref()));
            if let Some(cookie) = ctx.folo.cookie.as_deref().filter(|c| !c.is_empty()) {
                request = request.header(reqwest::header::COOKIE, cookie);
            }

            debug!(source = %self.id, page, "Fetching Folo page");
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(source = %self.id, page, error = %err, "Folo request failed");
                    break;
                }
            };
            if !response.status().is_success() {
                warn!(source = %self.id, page, status = %response.status(), "Folo request failed");
                break;
            }
            let parsed: EntriesPage = match response.json().await {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(source = %self.id, page, error = %err, "Folo response was not valid JSON");
                    break;
                }
            };
            if parsed.data.is_empty() {
                debug!(source = %self.id, page, "No more Folo entries");
                break;
            }

            cursor = parsed
                .data
                .last()
                .and_then(|e| e.entries.published_at.clone());
            items.extend(
                parsed
                    .data
                    .into_iter()
                    .filter(|e| {
                        e.entries.published_at.as_deref().is_some_and(|published| {
                            is_within_last_days(published, ctx.fetch_date, ctx.folo.filter_days)
                        })
                    })
                    .map(|e| self.to_item(e)),
            );

            if page < self.pages && !ctx.folo.page_delay.is_zero() {
                tokio::time::sleep(ctx.folo.page_delay).await;
            }
        }

        if self.translate_titles
            && let Some(client) = &ctx.translator
            && !items.is_empty()
        {
            self.translate_item_titles(client, &mut items, ctx.translate_batch_size)
                .await;
        }
        Ok(items)
    }

    /// Replaces titles with their translation, keeping the original in
    /// `details.original_title`. Failed entries keep the original title.
    async fn translate_item_titles(
        &self,
        client: &ChatClient,
        items: &mut [UnifiedItem],
        batch_size: usize,
    ) {
        let titles: Vec<String> = items.iter().map(|item| item.title.clone()).collect();
        let translated = translate_texts(client, &titles, batch_size).await;
        let mut count = 0;
        for (item, translated) in items.iter_mut().zip(translated) {
            let Some(title) = translated.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            let original = std::mem::replace(&mut item.title, title);
            item.details["original_title"] = Value::String(original);
            count += 1;
        }
        debug!(source = %self.id, translated = count, total = items.len(), "Translated titles");
    }
}

impl DataSource for FoloSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        self.category
    }

    fn fetch<'a>(&'a self, ctx: &'a FetchContext) -> BoxFuture<'a, Result<Vec<UnifiedItem>>> {
        Box::pin(self.fetch_pages(ctx))
    }
}
