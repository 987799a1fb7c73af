//! `aidigest generate`: summarize stored items into the daily report.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use aidigest_core::kv::{data_key, get_json};
use aidigest_core::report::{build_prompt, compose_daily_markdown, generate_daily, select_items};
use aidigest_core::sources::{Category, UnifiedItem};
use aidigest_core::{Config, FetchDate};
use anyhow::{Context, Result, bail};
use tracing::info;

use super::{chat_client, open_store};

pub struct GenerateOptions<'a> {
    pub config: &'a Config,
    pub date: FetchDate,
    pub category: Option<Category>,
    pub ids: &'a [String],
    pub stream: bool,
    pub out: Option<&'a Path>,
}

pub async fn run(opts: GenerateOptions<'_>) -> Result<()> {
    let config = opts.config;
    let store = open_store(config);

    let categories: Vec<Category> = match opts.category {
        Some(category) => vec![category],
        None => Category::ALL.to_vec(),
    };
    let mut stored = BTreeMap::new();
    for category in categories {
        let items: Vec<UnifiedItem> =
            get_json(&store, &data_key(opts.date, category))?.unwrap_or_default();
        stored.insert(category, items);
    }

    let items = select_items(&stored, opts.ids);
    if items.is_empty() {
        bail!(
            "No selected items for {}. Run `aidigest fetch` first or check --ids.",
            opts.date
        );
    }
    info!(count = items.len(), date = %opts.date, "Generating report");

    let prompt = build_prompt(&items, &config.report_prompt()?);
    let client = chat_client(config)?;
    let mut stderr = std::io::stderr();
    let body = generate_daily(&client, &prompt, opts.stream, |fragment| {
        let _ = stderr.write_all(fragment.as_bytes());
        let _ = stderr.flush();
    })
    .await?;
    if opts.stream {
        eprintln!();
    }

    let markdown =
        compose_daily_markdown(&config.report.title, &config.report.subtitle, opts.date, &body);
    match opts.out {
        Some(path) => {
            fs::write(path, &markdown)
                .with_context(|| format!("write report to {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{markdown}"),
    }
    Ok(())
}
