//! `aidigest commit` and `aidigest rss-data`: push the report to GitHub and
//! prepare its RSS record.

use std::fs;
use std::path::Path;

use aidigest_core::report::{commit_daily, write_rss_data};
use aidigest_core::{Config, FetchDate};
use anyhow::{Context, Result};
use serde_json::json;

use super::{github_client, open_store, print_json};

pub async fn commit(config: &Config, date: FetchDate, file: &Path) -> Result<()> {
    let markdown = fs::read_to_string(file)
        .with_context(|| format!("read report from {}", file.display()))?;
    let github = github_client(config)?;
    let outcome = commit_daily(&github, date, &markdown).await?;
    print_json(&json!({
        "status": "success",
        "date": date.to_string(),
        "file": outcome.path,
        "message": if outcome.created { "Successfully created." } else { "Successfully updated." },
    }))
}

pub async fn rss_data(config: &Config, date: FetchDate) -> Result<()> {
    let github = github_client(config)?;
    let store = open_store(config);
    let record = write_rss_data(
        &github,
        &store,
        date,
        &config.report.image_proxy,
        config.storage_ttl(),
    )
    .await?;
    print_json(&serde_json::to_value(record)?)
}
