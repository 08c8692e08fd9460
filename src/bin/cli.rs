//! Harvest CLI
//!
//! Local execution entry point: fetch a snapshot, query stored records,
//! or validate configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use harvest::{
    error::{AppError, Result},
    models::Config,
    pipeline,
    services::{Credentials, RedditClient},
    storage::{FilterMap, StorageBackend, StorageOptions, create_storage},
};
use indicatif::ProgressBar;

/// harvest - Reddit snapshot collector
#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    version,
    about = "Harvests Reddit posts and comments into pluggable storage backends"
)]
struct Cli {
    /// Path to a TOML config file (default: harvest.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend: sqlite, json, or csv
    #[arg(long)]
    storage: Option<String>,

    /// Directory for data files and the default sqlite database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch posts and comments, clean them, and persist a snapshot
    Run {
        /// Subreddit to harvest
        #[arg(long)]
        subreddit: Option<String>,

        /// Maximum number of posts
        #[arg(long)]
        limit: Option<u32>,

        /// Post sort mode: hot, new, top, rising, controversial
        #[arg(long)]
        sort: Option<String>,

        /// Time window for top/controversial: hour, day, week, month, year, all
        #[arg(long)]
        time: Option<String>,

        /// Comment sort mode: best, top, new, controversial, old, qa
        #[arg(long)]
        comment_sort: Option<String>,

        /// Minimum score kept by the cleaning pass
        #[arg(long)]
        min_score: Option<i64>,

        /// Normalize title/selftext/body text fields
        #[arg(long)]
        clean_text: bool,

        /// Skip comment fetching
        #[arg(long)]
        skip_comments: bool,
    },

    /// Print stored records matching equality filters, one JSON per line
    Query {
        /// Query comments instead of posts
        #[arg(long)]
        comments: bool,

        /// Equality filter, field=value (repeatable)
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
    },

    /// Validate configuration and credentials
    Validate,

    /// Show storage location and stored record counts
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Parse repeated `field=value` flags into a filter map.
fn parse_filters(raw: &[String]) -> Result<FilterMap> {
    let mut filter = FilterMap::new();
    for entry in raw {
        let (field, value) = entry
            .split_once('=')
            .ok_or_else(|| AppError::config(format!("filter '{entry}' is not field=value")))?;
        filter.insert(field.to_string(), parse_filter_value(value));
    }
    Ok(filter)
}

/// Interpret a filter value as integer, float, bool, or string.
fn parse_filter_value(raw: &str) -> serde_json::Value {
    if let Ok(i) = raw.parse::<i64>() {
        return serde_json::Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::Value::from(f);
    }
    if let Ok(b) = raw.parse::<bool>() {
        return serde_json::Value::from(b);
    }
    serde_json::Value::from(raw)
}

/// Build the configured storage backend.
async fn open_storage(config: &Config) -> Result<Box<dyn StorageBackend>> {
    let options = StorageOptions {
        db_path: Some(
            config
                .storage
                .db_path
                .clone()
                .unwrap_or_else(|| config.storage.data_dir.join("harvest.db")),
        ),
        data_dir: Some(config.storage.data_dir.clone()),
    };
    create_storage(config.storage.kind, &options).await
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("harvest starting...");

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default("harvest.toml"),
    };

    // Global flags override the config file.
    if let Some(kind) = &cli.storage {
        config.storage.kind = kind.parse()?;
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }

    if let Err(e) = execute(cli.command, config).await {
        log::error!("Run failed: {e}");
        return Err(e);
    }

    log::info!("Done!");
    Ok(())
}

async fn execute(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::Run {
            subreddit,
            limit,
            sort,
            time,
            comment_sort,
            min_score,
            clean_text,
            skip_comments,
        } => {
            if let Some(subreddit) = subreddit {
                config.fetch.subreddit = subreddit;
            }
            if let Some(limit) = limit {
                config.fetch.limit = limit;
            }
            if let Some(sort) = sort {
                config.fetch.sort = sort.parse()?;
            }
            if let Some(time) = time {
                config.fetch.time = time.parse()?;
            }
            if let Some(comment_sort) = comment_sort {
                config.fetch.comment_sort = comment_sort.parse()?;
            }
            if min_score.is_some() {
                config.cleaning.min_score = min_score;
            }
            if clean_text {
                config.cleaning.clean_text = true;
            }
            if skip_comments {
                config.fetch.skip_comments = true;
            }
            config.validate()?;

            let client = RedditClient::new(&config)?;
            let storage = open_storage(&config).await?;

            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(format!("Harvesting r/{}...", config.fetch.subreddit));

            let outcome = pipeline::run_harvest(&config, &client, storage.as_ref()).await;
            spinner.finish_and_clear();
            let summary = outcome?;

            storage.close().await?;

            log::info!(
                "Snapshot complete: {} posts and {} comments stored ({} backend)",
                summary.stored_posts,
                summary.stored_comments,
                config.storage.kind
            );
        }

        Command::Query { comments, filters } => {
            let filter = parse_filters(&filters)?;
            let storage = open_storage(&config).await?;

            let filter = (!filter.is_empty()).then_some(&filter);
            if comments {
                for comment in storage.get_comments(filter).await? {
                    println!("{}", serde_json::to_string(&comment)?);
                }
            } else {
                for post in storage.get_posts(filter).await? {
                    println!("{}", serde_json::to_string(&post)?);
                }
            }

            storage.close().await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            Credentials::resolve(&config.reddit)?;
            log::info!("✓ Credentials present");

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage backend: {}", config.storage.kind);
            log::info!("Data directory: {}", config.storage.data_dir.display());

            let storage = open_storage(&config).await?;
            let posts = storage.get_posts(None).await?.len();
            let comments = storage.get_comments(None).await?.len();
            storage.close().await?;

            log::info!("Stored posts: {posts}");
            log::info!("Stored comments: {comments}");
        }
    }

    Ok(())
}
