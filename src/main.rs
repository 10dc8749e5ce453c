use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use comment_triage::app::{Dashboard, RefreshOutcome};
use comment_triage::config;
use comment_triage::db::{self, SqliteKv, StateStore};
use comment_triage::gateway::RelayClient;
use comment_triage::marks::Confirmation;
use comment_triage::report;
use comment_triage::sync::{ProgressEvent, ProgressSink};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show or change the tracked creator and lookback window
    Settings {
        #[arg(long)]
        urlname: Option<String>,
        /// Days to look back; 0 means no limit
        #[arg(long)]
        range_days: Option<u32>,
    },
    /// Fetch fresh data and print the worklist
    Refresh,
    /// Print the worklist from the cache
    Show,
    /// Print the link for a comment and start the reply check
    Open { comment_key: String },
    /// Answer the pending "did you reply?" question
    Resume {
        #[arg(value_enum)]
        answer: Answer,
    },
    /// Mark a comment as replied
    Mark { comment_key: String },
    /// Look up a creator through the relay's legacy id mode
    Lookup { creator_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Answer {
    Yes,
    No,
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::ListingArticles { page, collected } => {
            eprintln!("listing articles: page {page} ({collected} with comments so far)")
        }
        ProgressEvent::FetchingComments {
            index,
            total,
            title,
        } => eprintln!("fetching comments {index}/{total}: {title}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/triage.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let store = StateStore::new(Arc::new(SqliteKv::new(pool)));

    let client = RelayClient::from_config(&cfg)?;
    let links = client.links().clone();

    if let Command::Lookup { creator_id } = &args.command {
        let profile = client.lookup_creator_legacy(creator_id).await?;
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    let dashboard = Dashboard::new(
        Arc::new(client),
        store,
        links,
        cfg.ranking_policy(),
        cfg.pacing(),
    );

    match args.command {
        Command::Settings {
            urlname,
            range_days,
        } => {
            let settings = dashboard
                .update_settings(urlname.as_deref(), range_days)
                .await?;
            println!("urlname: {}", settings.urlname);
            println!("range_days: {}", settings.range_days);
        }
        Command::Refresh => {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_progress(&event);
                }
            });
            let outcome = dashboard.refresh(&ProgressSink::new(tx)).await;
            let _ = printer.await;
            match outcome {
                RefreshOutcome::Refreshed { articles } => {
                    info!(articles, "refreshed");
                }
                RefreshOutcome::KeptCache { error } => {
                    eprintln!("refresh failed, showing cached data: {error}");
                }
                RefreshOutcome::Failed { message } => {
                    anyhow::bail!("refresh failed: {message}");
                }
                RefreshOutcome::NotConfigured => {
                    anyhow::bail!("no urlname configured; run `settings --urlname <name>` first");
                }
                RefreshOutcome::AlreadyRunning => {
                    warn!("refresh already running");
                    return Ok(());
                }
            }
            print!("{}", report::render(&dashboard.view().await, Utc::now()));
        }
        Command::Show => {
            let worklist = dashboard.rerender().await;
            print!("{}", report::render(&worklist, Utc::now()));
        }
        Command::Open { comment_key } => {
            let opened = dashboard.open_comment(&comment_key).await?;
            println!("{}", opened.url);
            if opened.awaiting_confirmation {
                eprintln!("after replying, run `resume yes` (or `resume no`)");
            }
        }
        Command::Resume { answer } => {
            let Some(pending) = dashboard.on_activate().await else {
                println!("nothing awaiting confirmation");
                return Ok(());
            };
            println!("{}: {}", pending.comment_key, pending.comment_body);
            match dashboard
                .confirm_reply(matches!(answer, Answer::Yes))
                .await?
            {
                Confirmation::Marked { comment_key, .. } => {
                    println!("marked {comment_key} as replied")
                }
                Confirmation::Dismissed { comment_key } => println!("left {comment_key} as is"),
            }
        }
        Command::Mark { comment_key } => {
            if dashboard.marks().mark_replied(&comment_key).await? {
                println!("marked {comment_key} as replied");
            } else {
                println!("{comment_key} was already marked");
            }
        }
        Command::Lookup { .. } => {}
    }

    Ok(())
}
