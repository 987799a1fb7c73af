//! `aidigest content`: dump the stored items of a date.

use aidigest_core::kv::{data_key, get_json};
use aidigest_core::sources::{Category, UnifiedItem};
use aidigest_core::{Config, FetchDate};
use anyhow::Result;
use serde_json::json;

use super::{open_store, print_json};

pub fn run(config: &Config, date: FetchDate) -> Result<()> {
    let store = open_store(config);
    let mut output = json!({
        "date": date.to_string(),
        "message": format!("Successfully retrieved data for {date}."),
    });
    for category in Category::ALL {
        let items: Vec<UnifiedItem> =
            get_json(&store, &data_key(date, category))?.unwrap_or_default();
        output[category.as_str()] = serde_json::to_value(items)?;
    }
    print_json(&output)
}
