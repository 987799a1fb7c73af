//! Content pipeline behind the `aidigest` binary.
//!
//! Sources are fetched per category into a key-value store, a daily report is
//! generated from selected items, committed to GitHub, and rendered into an
//! RSS channel.

pub mod config;
pub mod date;
pub mod github;
pub mod kv;
pub mod logging;
pub mod report;
pub mod rss;
pub mod sources;
pub mod text;
pub mod translate;

pub use config::Config;
pub use date::FetchDate;
