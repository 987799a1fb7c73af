//! RSS 2.0 channel over the stored report records.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::date::{FetchDate, format_rss_date, parse_published};
use crate::kv::{KvStore, get_json, report_key};
use crate::report::ReportRecord;
use crate::text::{escape_html, minify_html, strip_html, truncate_chars};

const DESCRIPTION_CHARS: usize = 200;

/// Channel-level metadata.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub title: String,
    /// Site root; item links are `site_link + record.link`.
    pub site_link: String,
    pub description: String,
}

/// Records stored for the `days` days ending at `today`, newest day first.
pub fn load_recent_reports(
    store: &dyn KvStore,
    today: FetchDate,
    days: u32,
) -> Result<Vec<ReportRecord>> {
    let mut records = Vec::new();
    for offset in 0..u64::from(days) {
        let key = report_key(today.days_back(offset));
        if let Some(record) = get_json::<ReportRecord>(store, &key)? {
            records.push(record);
        }
    }
    Ok(records)
}

fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn published_at(record: &ReportRecord) -> Option<DateTime<Utc>> {
    parse_published(&record.published_date).map(|dt| dt.with_timezone(&Utc))
}

/// Keeps the most recently published record of each report date, newest
/// report date first.
pub fn latest_per_date(records: Vec<ReportRecord>) -> Vec<ReportRecord> {
    let mut by_date: BTreeMap<String, ReportRecord> = BTreeMap::new();
    for record in records {
        let replace = by_date
            .get(&record.report_date)
            .is_none_or(|current| published_at(&record) > published_at(current));
        if replace {
            by_date.insert(record.report_date.clone(), record);
        }
    }
    by_date.into_values().rev().collect()
}

/// Renders the channel. `now` stamps `lastBuildDate` and undated items.
pub fn build_rss(records: Vec<ReportRecord>, channel: &ChannelInfo, now: DateTime<Utc>) -> String {
    let mut items = String::new();
    for record in latest_per_date(records) {
        let title = if record.title.trim().is_empty() {
            "无标题"
        } else {
            record.title.as_str()
        };
        let link = format!("{}{}", channel.site_link, record.link);
        let pub_date = format_rss_date(published_at(&record).unwrap_or(now));
        let description = truncate_chars(&strip_html(&record.content_html), DESCRIPTION_CHARS);

        let _ = write!(
            items,
            "\n    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{pub_date}</pubDate>\n      <content:encoded>{}</content:encoded>\n      <description>{}</description>\n    </item>",
            cdata(title),
            escape_html(&link),
            escape_html(&link),
            cdata(&minify_html(&record.content_html)),
            cdata(&description),
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <language>zh-cn</language>
    <lastBuildDate>{}</lastBuildDate>{items}
  </channel>
</rss>
"#,
        escape_html(&channel.title),
        escape_html(&channel.site_link),
        escape_html(&channel.description),
        format_rss_date(now),
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::kv::{DEFAULT_TTL, MemoryKvStore, put_json};

    fn record(date: &str, title: &str, html: &str, published: &str) -> ReportRecord {
        ReportRecord {
            report_date: date.to_string(),
            title: title.to_string(),
            link: format!("/daily/{date}.html"),
            content_html: html.to_string(),
            published_date: published.to_string(),
        }
    }

    fn channel() -> ChannelInfo {
        ChannelInfo {
            title: "AI洞察日报 RSS Feed".to_string(),
            site_link: "https://news.example".to_string(),
            description: "近 7 天的AI日报".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_latest_per_date_keeps_newest_publication() {
        let records = vec![
            record("2025-06-01", "old", "", "2025-06-01T01:00:00Z"),
            record("2025-06-02", "other", "", "2025-06-02T01:00:00Z"),
            record("2025-06-01", "new", "", "2025-06-01T05:00:00Z"),
        ];
        let titles: Vec<String> = latest_per_date(records).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["other", "new"]);
    }

    #[test]
    fn test_build_rss_item() {
        let html = "<h1>Today</h1>\n<p>Body &amp; more</p>\n";
        let xml = build_rss(
            vec![record("2025-06-01", "", html, "2025-06-01T02:00:00Z")],
            &channel(),
            now(),
        );

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\""));
        assert!(xml.contains("<title><![CDATA[无标题]]></title>"));
        assert!(xml.contains("<link>https://news.example/daily/2025-06-01.html</link>"));
        assert!(xml.contains("<pubDate>Sun, 01 Jun 2025 02:00:00 GMT</pubDate>"));
        assert!(xml.contains(
            "<content:encoded><![CDATA[<h1>Today</h1><p>Body &amp; more</p>]]></content:encoded>"
        ));
        assert!(xml.contains("<description><![CDATA[Today Body &amp; more]]></description>"));
        assert!(xml.contains("<lastBuildDate>Mon, 02 Jun 2025 00:00:00 GMT</lastBuildDate>"));
    }

    #[test]
    fn test_description_is_truncated_and_cdata_escaped() {
        let long = format!("<p>{}</p>", "字".repeat(300));
        let xml = build_rss(
            vec![record("2025-06-01", "t]]>x", &long, "bad date")],
            &channel(),
            now(),
        );
        assert!(xml.contains(&format!("<description><![CDATA[{}]]></description>", "字".repeat(200))));
        assert!(xml.contains("<title><![CDATA[t]]]]><![CDATA[>x]]></title>"));
        assert!(xml.contains("<pubDate>Mon, 02 Jun 2025 00:00:00 GMT</pubDate>"));
    }

    #[test]
    fn test_empty_channel_is_valid() {
        let xml = build_rss(Vec::new(), &channel(), now());
        assert!(!xml.contains("<item>"));
        assert!(xml.trim_end().ends_with("</rss>"));
    }

    #[test]
    fn test_load_recent_reports_walks_back_from_today() {
        let store = MemoryKvStore::new();
        for date in ["2025-06-02", "2025-05-31", "2025-05-20"] {
            put_json(
                &store,
                &format!("{date}-report"),
                &record(date, date, "", "2025-06-01T00:00:00Z"),
                DEFAULT_TTL,
            )
            .unwrap();
        }

        let records = load_recent_reports(&store, "2025-06-02".parse().unwrap(), 7).unwrap();
        let dates: Vec<&str> = records.iter().map(|r| r.report_date.as_str()).collect();
        assert_eq!(dates, ["2025-06-02", "2025-05-31"]);
    }
}
