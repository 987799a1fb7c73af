//! `aidigest rss`: print the channel for the last few days.

use aidigest_core::rss::{ChannelInfo, build_rss, load_recent_reports};
use aidigest_core::{Config, FetchDate};
use anyhow::Result;
use chrono::Utc;

use super::open_store;

pub fn run(config: &Config, days: u32) -> Result<()> {
    let store = open_store(config);
    let now = Utc::now();
    let records = load_recent_reports(&store, FetchDate::at(now), days)?;
    if records.is_empty() {
        tracing::warn!(days, "No reports stored for the requested window");
    }
    let channel = ChannelInfo {
        title: format!("{} RSS Feed", config.report.title),
        site_link: config.report.site_link.clone(),
        description: format!("近 {days} 天的AI日报"),
    };
    print!("{}", build_rss(records, &channel, now));
    Ok(())
}
