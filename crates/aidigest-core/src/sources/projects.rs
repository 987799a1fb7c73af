//! Trending repositories from a JSON endpoint.

use aidigest_providers::USER_AGENT;
use anyhow::{Context, Result, bail};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Category, DataSource, FetchContext, UnifiedItem};
use crate::translate::translate_texts;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    language_color: Option<String>,
    #[serde(default)]
    total_stars: Option<Value>,
    #[serde(default)]
    forks: Option<Value>,
    #[serde(default)]
    stars_today: Option<Value>,
    #[serde(default)]
    built_by: Option<Value>,
}

/// GitHub trending style list; projects carry no publish time, so every
/// item is dated with the fetch date.
#[derive(Debug, Clone)]
pub struct ProjectsSource {
    id: String,
    url: String,
}

impl ProjectsSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    async fn fetch_projects(&self, ctx: &FetchContext) -> Result<Vec<UnifiedItem>> {
        debug!(url = %self.url, "Fetching projects");
        let response = ctx
            .http
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Failed to fetch projects from {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "HTTP error! status: {}, message: {body}, url: {}",
                status.as_u16(),
                self.url
            );
        }
        let raw: Value = response
            .json()
            .await
            .context("Projects response is not valid JSON")?;
        let Value::Array(entries) = raw else {
            bail!("Invalid projects data format: expected a JSON array");
        };
        let projects: Vec<Project> = entries
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .context("Invalid project entry")?;

        let descriptions: Vec<String> = projects
            .iter()
            .map(|p| p.description.clone().unwrap_or_default())
            .collect();
        let translated = match &ctx.translator {
            Some(client) if !projects.is_empty() => {
                translate_texts(client, &descriptions, ctx.translate_batch_size).await
            }
            _ => vec![None; projects.len()],
        };

        let date = ctx.fetch_date.to_string();
        Ok(projects
            .into_iter()
            .zip(descriptions.into_iter().zip(translated))
            .enumerate()
            .map(|(index, (project, (original, translated)))| UnifiedItem {
                id: (index + 1).to_string(),
                kind: Category::Project,
                url: project.url.unwrap_or_default(),
                title: project.name.clone().unwrap_or_default(),
                description: translated.filter(|t| !t.is_empty()).unwrap_or(original),
                published_date: date.clone(),
                authors: project.owner.clone().unwrap_or_default(),
                source: "GitHub Trending".to_string(),
                details: json!({
                    "owner": project.owner,
                    "name": project.name,
                    "language": project.language,
                    "languageColor": project.language_color,
                    "totalStars": project.total_stars,
                    "forks": project.forks,
                    "starsToday": project.stars_today,
                    "builtBy": project.built_by.unwrap_or_else(|| json!([])),
                }),
            })
            .collect())
    }
}

impl DataSource for ProjectsSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        Category::Project
    }

    fn fetch<'a>(&'a self, ctx: &'a FetchContext) -> BoxFuture<'a, Result<Vec<UnifiedItem>>> {
        Box::pin(self.fetch_projects(ctx))
    }
}
