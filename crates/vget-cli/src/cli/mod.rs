//! CLI for the vget batch media download client.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use vget_core::config;

use commands::{run_config, run_get, run_list, run_stop};

/// Top-level CLI for the vget download client.
#[derive(Debug, Parser)]
#[command(name = "vget")]
#[command(about = "vget: batch media download client", long_about = None)]
pub struct Cli {
    /// Base URL of the downloader service (overrides the config file).
    #[arg(long, global = true, value_name = "URL")]
    pub service: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where to enumerate items from: a channel or an explicit URL list.
#[derive(Debug, clap::Args)]
pub struct SourceArgs {
    /// Channel/page URL to enumerate.
    #[arg(long, value_name = "URL", conflicts_with = "urls_file")]
    pub channel: Option<String>,

    /// File with one video URL per line ("-" reads stdin).
    #[arg(long, value_name = "FILE")]
    pub urls_file: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Destination directory on the service host.
    #[arg(long, value_name = "DIR")]
    pub dest: Option<String>,

    /// Quality selector (best, 1080p, 720p, 480p).
    #[arg(long)]
    pub quality: Option<String>,

    /// Concurrent transfers on the service side (1-10).
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<u8>,

    /// Select only items with at least this many likes (suffixes work: "10K").
    #[arg(long, value_name = "N")]
    pub min_likes: Option<String>,

    /// Select only items with at least this many views.
    #[arg(long, value_name = "N")]
    pub min_views: Option<String>,

    /// Select only items with at least this many comments.
    #[arg(long, value_name = "N")]
    pub min_comments: Option<String>,

    /// Select only items with at least this many shares.
    #[arg(long, value_name = "N")]
    pub min_shares: Option<String>,

    /// Select only items with at least this many collects.
    #[arg(long, value_name = "N")]
    pub min_collects: Option<String>,

    /// If the job errors out, mark unfinished items failed instead of
    /// leaving them at their last-known status.
    #[arg(long)]
    pub mark_failed: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Enumerate items from a source and print the catalog.
    List {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Enumerate, select, and download items, relaying live progress.
    Get(GetArgs),

    /// Signal the service to stop current work.
    Stop,

    /// Show the configuration; optionally pick a new save directory.
    Config {
        /// Ask the service host for a directory chooser and persist the result.
        #[arg(long)]
        pick_dir: bool,
    },

    /// Generate shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        if let Some(service) = cli.service {
            cfg.service_url = service;
        }
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::List { source } => run_list(&cfg, source).await,
            CliCommand::Get(args) => run_get(&cfg, args).await,
            CliCommand::Stop => run_stop(&cfg).await,
            CliCommand::Config { pick_dir } => run_config(cfg, pick_dir).await,
            CliCommand::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "vget", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}
