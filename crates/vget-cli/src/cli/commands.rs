//! Implementations of the vget subcommands.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use vget_core::client::ServiceClient;
use vget_core::config::{self, VgetConfig};
use vget_core::ingest::{IngestPhase, IngestSummary};
use vget_core::metrics::parse_metric;
use vget_core::registry::Item;
use vget_core::relay::{JobErrorPolicy, RelayEnd, TransferOutcome};
use vget_core::session::Session;

use super::{GetArgs, SourceArgs};

fn build_session(cfg: &VgetConfig) -> Result<Session> {
    let client = ServiceClient::new(&cfg.service_url).context("create service client")?;
    Ok(Session::new(client, cfg.download.clone()))
}

/// Ingests the catalog from whichever source the user gave.
async fn fetch(session: &Session, source: &SourceArgs) -> Result<IngestSummary> {
    let summary = if let Some(channel) = &source.channel {
        session.fetch_channel(channel).await?
    } else if let Some(path) = &source.urls_file {
        let text = read_url_list(path)?;
        session.fetch_urls(&text).await?
    } else {
        bail!("either --channel or --urls-file is required");
    };
    if summary.cancelled {
        tracing::info!("catalog fetch stopped early with {} item(s)", summary.appended);
    }
    Ok(summary)
}

fn read_url_list(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read url list from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("read url list from {}", path.display()))
    }
}

pub async fn run_list(cfg: &VgetConfig, source: SourceArgs) -> Result<()> {
    let session = build_session(cfg)?;

    // Announce the moment the first chunk lands; channel scrapes can take
    // a while before the stream finishes.
    let mut phase = session.ingest_phase();
    let watcher = tokio::spawn(async move {
        while phase.changed().await.is_ok() {
            if *phase.borrow() == IngestPhase::FirstResults {
                eprintln!("first results received, still fetching...");
                break;
            }
        }
    });

    let summary = fetch(&session, &source).await?;
    watcher.abort();

    print_items(&session.registry().snapshot());
    println!("{} item(s)", summary.appended);
    Ok(())
}

fn print_items(items: &[Item]) {
    println!(
        "{:>4}  {:<11} {:>10} {:>10} {:>9} {:>8}  {}",
        "id", "status", "likes", "views", "comments", "shares", "url"
    );
    for item in items {
        println!(
            "{:>4}  {:<11} {:>10} {:>10} {:>9} {:>8}  {}",
            item.id,
            item.status.to_string(),
            item.likes.value(),
            item.views.value(),
            item.comments.value(),
            item.shares.value(),
            item.url
        );
    }
}

#[derive(Debug, Default)]
struct MetricFilters {
    likes: u64,
    views: u64,
    comments: u64,
    shares: u64,
    collects: u64,
}

impl MetricFilters {
    fn from_args(args: &GetArgs) -> Self {
        let threshold = |raw: &Option<String>| raw.as_deref().map(parse_metric).unwrap_or(0);
        MetricFilters {
            likes: threshold(&args.min_likes),
            views: threshold(&args.min_views),
            comments: threshold(&args.min_comments),
            shares: threshold(&args.min_shares),
            collects: threshold(&args.min_collects),
        }
    }

    fn passes(&self, item: &Item) -> bool {
        item.likes.value() >= self.likes
            && item.views.value() >= self.views
            && item.comments.value() >= self.comments
            && item.shares.value() >= self.shares
            && item.collects.value() >= self.collects
    }
}

pub async fn run_get(cfg: &VgetConfig, args: GetArgs) -> Result<()> {
    let mut settings = cfg.download.clone();
    if let Some(dest) = &args.dest {
        settings.save_path = dest.clone();
    }
    if let Some(quality) = &args.quality {
        settings.quality = quality.clone();
    }
    if let Some(jobs) = args.concurrency {
        settings.concurrent_downloads = jobs;
    }

    let client = ServiceClient::new(&cfg.service_url).context("create service client")?;
    let mut session = Session::new(client, settings);
    if args.mark_failed {
        session = session.with_error_policy(JobErrorPolicy::MarkFailed);
    }
    let session = Arc::new(session);

    // Ctrl-C stops the run: cancels the ingest/relay subscription, tells
    // the service to halt, and sweeps active items to stopped.
    let stopper = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping...");
            stopper.stop().await;
        }
    });

    get_flow(&session, &args).await
}

/// Fetch, select, dispatch, relay. A stop during the fetch ends the
/// command here; the swept items must not roll into a dispatch.
async fn get_flow(session: &Arc<Session>, args: &GetArgs) -> Result<()> {
    let summary = fetch(session, &args.source).await?;
    if summary.cancelled {
        println!("stopped during fetch; nothing dispatched");
        return Ok(());
    }
    let appended = summary.appended;
    if appended == 0 {
        bail!("catalog returned no items");
    }

    let filters = MetricFilters::from_args(args);
    let eligible: Vec<u64> = session
        .registry()
        .snapshot()
        .iter()
        .filter(|item| filters.passes(item))
        .map(|item| item.id)
        .collect();
    let selected = session.select_ids(eligible);
    if selected == 0 {
        bail!("no items matched the metric thresholds");
    }
    println!("selected {} of {} item(s)", selected, appended);

    let (tx, mut rx) = tokio::sync::mpsc::channel::<vget_core::relay::ProgressUpdate>(64);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update.outcome {
                TransferOutcome::Success => {
                    let name = if update.filename.is_empty() {
                        update.url.as_str()
                    } else {
                        update.filename.as_str()
                    };
                    println!("[{}/{}] done  {}", update.completed, update.total, name);
                }
                TransferOutcome::Failure => {
                    println!(
                        "[{}/{}] FAIL  {} ({})",
                        update.completed, update.total, update.url, update.message
                    );
                }
            }
        }
    });

    let outcome = session.download_selected(Some(tx)).await;
    let _ = printer.await;
    let report = outcome?;

    match report.end {
        RelayEnd::Completed => {
            println!("completed {}/{}", report.completed, report.total);
            Ok(())
        }
        RelayEnd::JobFailed(message) => {
            bail!(
                "job failed after {}/{}: {}",
                report.completed,
                report.total,
                message
            );
        }
        RelayEnd::Cancelled => {
            println!("stopped at {}/{}", report.completed, report.total);
            Ok(())
        }
    }
}

pub async fn run_stop(cfg: &VgetConfig) -> Result<()> {
    let client = ServiceClient::new(&cfg.service_url).context("create service client")?;
    client.stop().await.context("send stop")?;
    println!("stop signal sent");
    Ok(())
}

pub async fn run_config(mut cfg: VgetConfig, pick_dir: bool) -> Result<()> {
    if pick_dir {
        let session = build_session(&cfg)?;
        match session.choose_save_path().await.context("directory chooser")? {
            Some(path) => {
                cfg.download.save_path = path;
                config::save(&cfg)?;
                println!("save path set to {}", cfg.download.save_path);
            }
            None => {
                println!(
                    "directory choice cancelled; keeping {}",
                    cfg.download.save_path
                );
            }
        }
    }

    println!("config file: {}", config::config_path()?.display());
    println!("service_url = {}", cfg.service_url);
    let d = &cfg.download;
    println!("save_path = {}", d.save_path);
    println!("quality = {}", d.quality);
    println!(
        "video = {} ({}), audio = {} ({})",
        d.video_enabled, d.video_format, d.audio_enabled, d.audio_format
    );
    println!("concurrent_downloads = {}", d.clamped_concurrency());
    Ok(())
}
