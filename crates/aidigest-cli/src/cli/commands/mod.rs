//! CLI command handlers.

use std::sync::Arc;

use aidigest_core::Config;
use aidigest_core::github::GitHubClient;
use aidigest_core::kv::FileKvStore;
use aidigest_providers::ChatClient;
use anyhow::{Context, Result};

pub mod config;
pub mod content;
pub mod fetch;
pub mod generate;
pub mod publish;
pub mod render;
pub mod rss;

fn open_store(config: &Config) -> FileKvStore {
    FileKvStore::new(config.storage_dir())
}

fn chat_client(config: &Config) -> Result<Arc<ChatClient>> {
    let chat_config = config.chat_config()?;
    let client = ChatClient::new(chat_config).context("configure chat client")?;
    Ok(Arc::new(client))
}

fn github_client(config: &Config) -> Result<GitHubClient> {
    GitHubClient::new(config.github_settings())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
