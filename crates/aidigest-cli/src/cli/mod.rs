//! CLI entry and dispatch.

use std::path::PathBuf;

use aidigest_core::sources::Category;
use aidigest_core::{Config, FetchDate, logging};
use anyhow::{Context, Result};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "aidigest")]
#[command(version)]
#[command(about = "Daily AI digest: fetch feeds, summarize with an LLM, publish markdown and RSS")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Fetch every configured source and store the items
    Fetch {
        /// Fetch date (YYYY-MM-DD, default: today in Asia/Shanghai)
        #[arg(long)]
        date: Option<FetchDate>,

        /// Only fetch this category (news, project, paper, socialMedia)
        #[arg(long)]
        category: Option<Category>,
    },

    /// Print the stored items of a date as JSON
    Content {
        /// Date to read (default: today)
        #[arg(long)]
        date: Option<FetchDate>,
    },

    /// Generate the daily report from stored items
    Generate {
        /// Date of the stored items (default: today)
        #[arg(long)]
        date: Option<FetchDate>,

        /// Only use items of this category
        #[arg(long)]
        category: Option<Category>,

        /// Item handles to include, as type:id (default: all items)
        #[arg(long, value_delimiter = ',', value_name = "TYPE:ID")]
        ids: Vec<String>,

        /// Stream the model output to stderr while generating
        #[arg(long)]
        stream: bool,

        /// Write the markdown to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Render markdown to HTML (reads stdin when no file is given)
    Render {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Commit a daily report to GitHub as daily/<date>.md
    Commit {
        /// Report date
        #[arg(long)]
        date: FetchDate,

        /// Markdown file to commit
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Render the committed report of a date and store it for the RSS feed
    RssData {
        /// Report date
        #[arg(long)]
        date: FetchDate,
    },

    /// Print the RSS feed of recent reports
    Rss {
        /// Number of days to include, today included
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli.command).await })
}

async fn dispatch(command: Commands) -> Result<()> {
    let load_config = || Config::load().context("load config");
    let today = FetchDate::today;

    match command {
        Commands::Fetch { date, category } => {
            commands::fetch::run(&load_config()?, date.unwrap_or_else(today), category).await
        }
        Commands::Content { date } => {
            commands::content::run(&load_config()?, date.unwrap_or_else(today))
        }
        Commands::Generate {
            date,
            category,
            ids,
            stream,
            out,
        } => {
            let config = load_config()?;
            commands::generate::run(commands::generate::GenerateOptions {
                config: &config,
                date: date.unwrap_or_else(today),
                category,
                ids: &ids,
                stream,
                out: out.as_deref(),
            })
            .await
        }
        Commands::Render { file } => commands::render::run(file.as_deref()),
        Commands::Commit { date, file } => {
            commands::publish::commit(&load_config()?, date, &file).await
        }
        Commands::RssData { date } => commands::publish::rss_data(&load_config()?, date).await,
        Commands::Rss { days } => commands::rss::run(&load_config()?, days),
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
