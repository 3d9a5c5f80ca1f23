//! devmesh CLI - operational jobs for the observability core

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use devmesh_core::backfill::{backfill_embeddings, backfill_templates, BackfillOptions};
use devmesh_core::retention::run_retention;
use devmesh_core::{Config, EmbeddingClient, Store, TemplateCache};

#[derive(Debug, Parser)]
#[command(
    name = "devmesh",
    author,
    version,
    about = "Operational jobs for the devmesh observability core",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON for programmatic use
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assign templates to events the live path left unassigned
    BackfillTemplates {
        /// Rows per batch
        #[arg(long, default_value = "100")]
        batch_size: i64,

        /// Seconds to sleep between batches
        #[arg(long, default_value = "2")]
        delay: f64,

        /// Safety cap on rows touched per run
        #[arg(long, default_value = "10000")]
        max_rows: i64,
    },

    /// Attach embeddings to templates missing a vector
    BackfillEmbeddings {
        /// Rows per batch
        #[arg(long, default_value = "50")]
        batch_size: i64,

        /// Seconds to sleep between batches for thermal cooldown
        #[arg(long, default_value = "0")]
        delay: f64,

        /// Safety cap on rows touched per run
        #[arg(long, default_value = "10000")]
        max_rows: i64,

        /// Also re-embed templates from a stale pipeline generation
        #[arg(long)]
        stale: bool,
    },

    /// Delete events (and unreferenced templates) beyond the horizon
    Retention {
        /// Retention period in days (defaults to the configured value)
        #[arg(long)]
        days: Option<i64>,

        /// Rows deleted per batch
        #[arg(long, default_value = "5000")]
        batch_size: i64,

        /// Preview what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Build the ANN index over template embeddings
    EnsureIndex,

    /// Show store counts
    Stats,
}

#[derive(Debug, Serialize)]
struct StatsSummary {
    events: i64,
    templates: i64,
    templates_missing_embedding: i64,
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    let store = Store::connect(
        &config.database_url,
        config.embedding.dim,
        config.max_db_connections,
    )
    .await?;

    match cli.command {
        Command::BackfillTemplates {
            batch_size,
            delay,
            max_rows,
        } => {
            let cache = TemplateCache::new(config.cache.capacity);
            let embedder = EmbeddingClient::new(config.embedding.clone())?;
            let opts = BackfillOptions {
                batch_size,
                delay: Duration::from_secs_f64(delay),
                max_rows,
            };
            info!(
                "template safety net (batch_size={batch_size}, delay={delay}s, max_rows={max_rows})"
            );
            let report = backfill_templates(
                &store,
                &cache,
                &embedder,
                &config.canon_version,
                &config.chunk_version,
                &opts,
            )
            .await?;
            emit(cli.json, &report, || {
                format!(
                    "scanned {} events, linked {}, created {} templates ({} unembedded)",
                    report.scanned,
                    report.linked,
                    report.new_templates,
                    report.embeddings_deferred
                )
            });
        }

        Command::BackfillEmbeddings {
            batch_size,
            delay,
            max_rows,
            stale,
        } => {
            let embedder = EmbeddingClient::new(config.embedding.clone())?;
            let opts = BackfillOptions {
                batch_size,
                delay: Duration::from_secs_f64(delay),
                max_rows,
            };
            info!(
                "embedding backfill (model={}, batch_size={batch_size}, delay={delay}s, stale={stale})",
                config.embedding.model
            );
            let report =
                backfill_embeddings(&store, &embedder, &config.canon_version, stale, &opts).await?;
            emit(cli.json, &report, || {
                format!(
                    "scanned {} templates, embedded {}, skipped {}",
                    report.scanned, report.embedded, report.skipped
                )
            });
        }

        Command::Retention {
            days,
            batch_size,
            dry_run,
        } => {
            let days = days.unwrap_or(config.retention.days);
            let horizon = chrono::Duration::days(days);
            let report = run_retention(&store, horizon, batch_size, dry_run).await?;
            emit(cli.json, &report, || {
                if let Some(would) = report.would_delete {
                    format!("dry run: would delete {would} events older than {days} days")
                } else {
                    format!(
                        "deleted {} events and {} templates in {} batches",
                        report.events_deleted, report.templates_deleted, report.batches
                    )
                }
            });
        }

        Command::EnsureIndex => {
            store.ensure_vector_index().await?;
            println!("vector index ready");
        }

        Command::Stats => {
            let summary = StatsSummary {
                events: store.count_events().await?,
                templates: store.count_templates().await?,
                templates_missing_embedding: store.count_templates_missing_embedding().await?,
            };
            emit(cli.json, &summary, || {
                format!(
                    "{} events, {} templates ({} missing embeddings)",
                    summary.events, summary.templates, summary.templates_missing_embedding
                )
            });
        }
    }

    store.close().await;
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) {
    if json {
        println!("{}", serde_json::to_string_pretty(value).unwrap());
    } else {
        println!("{}", text());
    }
}
