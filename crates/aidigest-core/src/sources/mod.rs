//! Feed sources and the registry that fans out over them.
//!
//! Every source produces [`UnifiedItem`]s for one [`Category`]. The registry
//! runs sources concurrently, logs and drops the ones that fail, and orders
//! the survivors newest first.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use aidigest_providers::ChatClient;
use anyhow::{Result, bail};
use futures_util::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::date::{FetchDate, sort_key};

pub mod folo;
pub mod projects;

pub use folo::{FoloSource, FoloTarget};
pub use projects::ProjectsSource;

/// Content bucket; also the suffix of the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    News,
    Project,
    Paper,
    SocialMedia,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::News,
        Category::Project,
        Category::Paper,
        Category::SocialMedia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Project => "project",
            Self::Paper => "paper",
            Self::SocialMedia => "socialMedia",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::News => "新闻",
            Self::Project => "项目",
            Self::Paper => "论文",
            Self::SocialMedia => "社交平台",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        match Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
        {
            Some(category) => Ok(category),
            None => bail!(
                "Unknown category '{wanted}'. Expected one of: news, project, paper, socialMedia"
            ),
        }
    }
}

/// Source-independent item shape stored per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Category,
    pub url: String,
    pub title: String,
    pub description: String,
    pub published_date: String,
    pub authors: String,
    pub source: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl UnifiedItem {
    /// `type:id`, the handle used to pick items for a report.
    pub fn selection_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

/// Folo entries API settings shared by every Folo-backed source.
#[derive(Debug, Clone, Default)]
pub struct FoloSettings {
    pub data_api: Option<String>,
    pub cookie: Option<String>,
    pub filter_days: u32,
    pub page_delay: Duration,
}

/// Everything a source needs for one fetch.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub http: reqwest::Client,
    pub fetch_date: FetchDate,
    pub folo: FoloSettings,
    /// Set when descriptions should be translated.
    pub translator: Option<Arc<ChatClient>>,
    pub translate_batch_size: usize,
}

impl FetchContext {
    pub fn new(fetch_date: FetchDate, folo: FoloSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            fetch_date,
            folo,
            translator: None,
            translate_batch_size: crate::translate::DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Option<Arc<ChatClient>>) -> Self {
        self.translator = translator;
        self
    }
}

/// A feed that can be fetched and normalized.
pub trait DataSource: Send + Sync {
    fn id(&self) -> &str;

    fn category(&self) -> Category;

    /// Fetches and transforms the source's items.
    fn fetch<'a>(&'a self, ctx: &'a FetchContext) -> BoxFuture<'a, Result<Vec<UnifiedItem>>>;
}

/// Newest first; unparsable dates go last. Stable for equal timestamps.
pub fn sort_newest_first(items: &mut [UnifiedItem]) {
    items.sort_by_key(|item| std::cmp::Reverse(sort_key(&item.published_date)));
}

#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn DataSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Runs every source of `category` concurrently.
    ///
    /// A failing source is logged and contributes nothing.
    pub async fn fetch_category(&self, ctx: &FetchContext, category: Category) -> Vec<UnifiedItem> {
        let selected: Vec<&dyn DataSource> = self
            .sources
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| s.category() == category)
            .collect();
        if selected.is_empty() {
            warn!(%category, "No sources registered for category");
            return Vec::new();
        }

        let results = join_all(selected.iter().map(|source| source.fetch(ctx))).await;

        let mut items = Vec::new();
        for (source, result) in selected.iter().zip(results) {
            match result {
                Ok(mut fetched) => {
                    info!(source = source.id(), count = fetched.len(), "Fetched items");
                    items.append(&mut fetched);
                }
                Err(err) => {
                    warn!(source = source.id(), error = %format!("{err:#}"), "Source failed");
                }
            }
        }
        sort_newest_first(&mut items);
        items
    }

    /// Fetches every category concurrently. Each category is always present
    /// in the result, possibly empty.
    pub async fn fetch_all(&self, ctx: &FetchContext) -> BTreeMap<Category, Vec<UnifiedItem>> {
        let results = join_all(
            Category::ALL
                .into_iter()
                .map(|category| async move { (category, self.fetch_category(ctx, category).await) }),
        )
        .await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::anyhow;

    use super::*;

    pub(crate) fn item(kind: Category, id: &str, published: &str) -> UnifiedItem {
        UnifiedItem {
            id: id.to_string(),
            kind,
            url: format!("https://example.com/{id}"),
            title: format!("Title {id}"),
            description: format!("Description {id}"),
            published_date: published.to_string(),
            authors: "someone".to_string(),
            source: "test".to_string(),
            details: serde_json::Value::Null,
        }
    }

    struct StaticSource {
        id: &'static str,
        category: Category,
        items: Result<Vec<UnifiedItem>, &'static str>,
    }

    impl DataSource for StaticSource {
        fn id(&self) -> &str {
            self.id
        }

        fn category(&self) -> Category {
            self.category
        }

        fn fetch<'a>(&'a self, _ctx: &'a FetchContext) -> BoxFuture<'a, Result<Vec<UnifiedItem>>> {
            Box::pin(async move { self.items.clone().map_err(|e| anyhow!(e)) })
        }
    }

    fn ctx() -> FetchContext {
        FetchContext::new("2025-06-01".parse().unwrap(), FoloSettings::default())
    }

    #[test]
    fn test_category_parse_and_serde() {
        assert_eq!("socialmedia".parse::<Category>().unwrap(), Category::SocialMedia);
        assert_eq!("news".parse::<Category>().unwrap(), Category::News);
        assert!("videos".parse::<Category>().is_err());
        assert_eq!(
            serde_json::to_string(&Category::SocialMedia).unwrap(),
            "\"socialMedia\""
        );
    }

    #[test]
    fn test_unified_item_json_shape() {
        let json = serde_json::to_value(item(Category::News, "7", "2025-06-01")).unwrap();
        assert_eq!(json["type"], "news");
        assert_eq!(json["published_date"], "2025-06-01");
        assert_eq!(item(Category::Paper, "9", "").selection_key(), "paper:9");
    }

    /// Test: a failing source is dropped while the others still contribute,
    /// and results are sorted newest first.
    #[tokio::test]
    async fn test_fetch_category_drops_failures_and_sorts() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource {
            id: "a",
            category: Category::News,
            items: Ok(vec![item(Category::News, "old", "2025-05-30T00:00:00Z")]),
        }));
        registry.register(Box::new(StaticSource {
            id: "broken",
            category: Category::News,
            items: Err("boom"),
        }));
        registry.register(Box::new(StaticSource {
            id: "b",
            category: Category::News,
            items: Ok(vec![
                item(Category::News, "new", "2025-06-01T09:00:00+08:00"),
                item(Category::News, "undated", ""),
            ]),
        }));
        registry.register(Box::new(StaticSource {
            id: "other",
            category: Category::Paper,
            items: Ok(vec![item(Category::Paper, "p", "2025-06-01")]),
        }));

        let items = registry.fetch_category(&ctx(), Category::News).await;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "undated"]);
    }

    #[tokio::test]
    async fn test_fetch_all_covers_every_category() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(StaticSource {
            id: "papers",
            category: Category::Paper,
            items: Ok(vec![item(Category::Paper, "p", "2025-06-01")]),
        }));
        registry.register(Box::new(StaticSource {
            id: "broken",
            category: Category::News,
            items: Err("boom"),
        }));

        let all = registry.fetch_all(&ctx()).await;
        assert_eq!(all.len(), 4);
        assert_eq!(all[&Category::Paper].len(), 1);
        assert!(all[&Category::News].is_empty());
        assert!(all[&Category::SocialMedia].is_empty());
    }
}
