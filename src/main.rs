// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use podfox::{
    BatchKind, BatchReport, Config, ConfigError, DownloadOptions, ErrorKind, Feed, FeedOutcome,
    FeedStore, NoopReporter, PodfoxError, ProgressEvent, ProgressReporter, ReqwestClient,
    SharedProgressReporter, StoreError, download_all, download_feed, import_feed, prune_all,
    prune_feed, synchronize, synchronize_all,
};

// Emoji with fallback for terminals without Unicode support
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");
static CHECK: Emoji<'_, '_> = Emoji("✓ ", "+ ");

/// Number of episodes shown by `episodes`
const EPISODE_LISTING_LIMIT: usize = 20;

/// Track podcast feeds, download new episodes and prune old ones
#[derive(Parser, Debug)]
#[command(name = "podfox")]
#[command(about = "Track podcast feeds, download new episodes and prune old ones")]
#[command(version)]
struct Args {
    /// Configuration file (default: ~/.podfox.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Import {
        /// Feed URL or path to a local feed file
        url: String,
        /// Name of the feed directory (derived from the feed title if omitted)
        shortname: Option<String>,
    },
    /// Fetch new episodes for one feed or all feeds
    Update { shortname: Option<String> },
    /// List subscribed feeds
    Feeds,
    /// Show the most recent episodes of a feed
    Episodes { shortname: String },
    /// Download outstanding episodes
    Download {
        shortname: Option<String>,
        /// Maximum number of episodes to download per feed
        #[arg(short = 'n', long)]
        how_many: Option<usize>,
    },
    /// Delete downloaded episodes older than a number of days
    Prune {
        shortname: Option<String>,
        #[arg(long)]
        maxage_days: Option<u64>,
    },
    /// Give a feed a new shortname
    Rename { old: String, new: String },
    /// Forget the download state of one feed or all feeds
    Reset { shortname: Option<String> },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.remove(&download_id) {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { shortname, url } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Fetching {}: {}",
                    shortname.bold(),
                    url.cyan()
                ));
            }

            ProgressEvent::FeedSynchronized {
                title,
                new_episodes,
                total_episodes,
                ..
            } => {
                self.println(format!(
                    "{HEADPHONES}{} • {} episodes total, {} new",
                    title.bold().green(),
                    total_episodes.to_string().cyan(),
                    new_episodes.to_string().yellow()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { shortname, count } => {
                self.println(format!(
                    "{BROOM}{} removed {} unfinished download(s)",
                    shortname.bold(),
                    count
                ));
            }

            ProgressEvent::DownloadStarting {
                download_id,
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                download_id,
                episode_title,
                filename,
                ..
            } => {
                self.finish_bar(download_id);
                self.println(format!(
                    "  {SUCCESS}{} {}",
                    truncate_title(&episode_title, 40).green(),
                    filename.dimmed()
                ));
            }

            ProgressEvent::DownloadFailed {
                download_id,
                episode_title,
                error,
            } => {
                self.finish_bar(download_id);
                self.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
            }

            ProgressEvent::EpisodePruned {
                episode_title,
                filename,
            } => {
                self.println(format!(
                    "  {BROOM}{} {}",
                    truncate_title(&episode_title, 40),
                    filename.dimmed()
                ));
            }

            ProgressEvent::PruneFailed {
                episode_title,
                error,
            } => {
                self.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
            }

            ProgressEvent::BatchCompleted {
                shortname,
                kind,
                succeeded,
                failed,
            } => {
                let verb = match kind {
                    BatchKind::Download => "downloaded",
                    BatchKind::Prune => "pruned",
                };
                self.println(format!(
                    "{PARTY}{} {} {}, {} failed",
                    format!("{shortname}:").bold().green(),
                    succeeded.to_string().green().bold(),
                    verb,
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                ));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn print_feeds(feeds: &[Feed]) {
    if feeds.is_empty() {
        println!("{}", "No feeds yet. Add one with `podfox import <url>`.".dimmed());
        return;
    }

    for feed in feeds {
        let marker = if feed.has_new_episode() {
            "*".yellow().bold()
        } else {
            " ".normal()
        };
        println!(
            "{marker} {} {} {}",
            feed.title.bold(),
            format!("[{}]", feed.shortname).cyan(),
            format!("{}/{} downloaded", feed.downloaded_count(), feed.episodes.len()).dimmed()
        );
    }
}

fn print_episodes(feed: &Feed) {
    println!("{HEADPHONES}{}", feed.title.bold().green());

    for episode in feed.episodes.iter().take(EPISODE_LISTING_LIMIT) {
        let date = DateTime::from_timestamp(episode.published, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "????-??-??".to_string());
        let status = if episode.downloaded {
            format!("{CHECK}").green()
        } else {
            "  ".normal()
        };
        println!("  {status}{} {}", date.dimmed(), episode.title);
    }

    if feed.episodes.len() > EPISODE_LISTING_LIMIT {
        println!(
            "  {}",
            format!("... and {} more", feed.episodes.len() - EPISODE_LISTING_LIMIT).dimmed()
        );
    }
}

fn print_failures(reports: &[FeedOutcome<BatchReport>]) {
    let failures: Vec<String> = reports
        .iter()
        .flat_map(|(shortname, result)| match result {
            Ok(report) => report
                .failed
                .iter()
                .map(|(title, error)| format!("{} - {}", title.yellow(), error.dimmed()))
                .collect(),
            Err(e) => vec![format!("{} - {}", shortname.yellow(), e.to_string().dimmed())],
        })
        .collect();

    if failures.is_empty() {
        return;
    }

    println!("\n{}", "Failures:".red().bold());
    for failure in failures {
        println!("  {CROSS}{failure}");
    }
}

/// Exit status for a finished batch: failure only when nothing succeeded
fn batch_exit_code(reports: &[FeedOutcome<BatchReport>]) -> ExitCode {
    let (succeeded, failed) = reports.iter().fold((0, 0), |(ok, bad), (_, result)| match result {
        Ok(report) => (ok + report.succeeded, bad + report.failed_count()),
        Err(_) => (ok, bad + 1),
    });

    if failed > 0 && succeeded == 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Exit status for a fatal error, from the first classified error in its chain
fn error_exit_code(error: &anyhow::Error) -> ExitCode {
    let kind = error.chain().find_map(|cause| {
        cause
            .downcast_ref::<PodfoxError>()
            .map(PodfoxError::kind)
            .or_else(|| cause.downcast_ref::<StoreError>().map(StoreError::kind))
            .or_else(|| cause.downcast_ref::<ConfigError>().map(ConfigError::kind))
    });

    let code = match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::Conflict) => 4,
        Some(ErrorKind::Fetch) => 5,
        Some(ErrorKind::Io) => 6,
        Some(ErrorKind::Format) => 7,
        None => 1,
    };
    ExitCode::from(code)
}

fn init_tracing(args: &Args) {
    // RUST_LOG wins over the command line flags
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args, reporter: SharedProgressReporter) -> Result<ExitCode> {
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    tracing::debug!(?config, "configuration loaded");

    let store = FeedStore::from_config(&config);
    let client = ReqwestClient::from_config(&config).context("Failed to create HTTP client")?;

    match args.command {
        Command::Import { url, shortname } => {
            let feed = import_feed(&client, &store, &config, &url, shortname.as_deref(), &reporter)
                .await
                .with_context(|| format!("Failed to import {url}"))?;
            if !args.quiet {
                println!(
                    "{FOLDER}Imported {} as {}",
                    feed.title.bold(),
                    feed.shortname.cyan()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Update { shortname: Some(shortname) } => {
            let feed = store.read(&shortname)?;
            synchronize(&client, &store, &config, &feed, &reporter)
                .await
                .with_context(|| format!("Failed to update {shortname}"))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Update { shortname: None } => {
            let results = synchronize_all(&client, &store, &config, &reporter)
                .await
                .context("Failed to update feeds")?;

            let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).collect();
            if !args.quiet && !failed.is_empty() {
                println!("\n{}", "Failures:".red().bold());
                for (shortname, result) in &failed {
                    if let Err(e) = result {
                        println!("  {CROSS}{} - {}", shortname.yellow(), e.to_string().dimmed());
                    }
                }
            }

            if !failed.is_empty() && failed.len() == results.len() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Command::Feeds => {
            print_feeds(&store.list()?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Episodes { shortname } => {
            print_episodes(&store.read(&shortname)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Download {
            shortname,
            how_many,
        } => {
            let options = DownloadOptions::from_config(&config, how_many);
            let reports = match shortname {
                Some(shortname) => {
                    let feed = store.read(&shortname)?;
                    let report = download_feed(&client, &store, &feed, &options, &reporter)
                        .await
                        .with_context(|| format!("Failed to download episodes of {shortname}"))?;
                    vec![(shortname, Ok(report))]
                }
                None => download_all(&client, &store, &options, &reporter)
                    .await
                    .context("Failed to download episodes")?,
            };

            if !args.quiet {
                print_failures(&reports);
            }
            Ok(batch_exit_code(&reports))
        }

        Command::Prune {
            shortname,
            maxage_days,
        } => {
            let max_age_days = maxage_days.or(config.retention_days());
            let reports = match shortname {
                Some(shortname) => {
                    let feed = store.read(&shortname)?;
                    let report = prune_feed(&store, &feed, max_age_days, &reporter)
                        .with_context(|| format!("Failed to prune {shortname}"))?;
                    vec![(shortname, Ok(report))]
                }
                None => prune_all(&store, max_age_days, &reporter).context("Failed to prune feeds")?,
            };

            if !args.quiet {
                print_failures(&reports);
            }
            Ok(batch_exit_code(&reports))
        }

        Command::Rename { old, new } => {
            let feed = store.rename(&old, &new)?;
            if !args.quiet {
                println!("{FOLDER}{} is now {}", old.dimmed(), feed.shortname.cyan());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Reset { shortname } => {
            let shortnames = match shortname {
                Some(shortname) => vec![shortname],
                None => store.list()?.into_iter().map(|f| f.shortname).collect(),
            };
            for shortname in shortnames {
                store.reset(&shortname)?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);
    tracing::debug!(?args, "CLI arguments parsed");

    let indicatif = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(reporter) => reporter.clone() as SharedProgressReporter,
        None => NoopReporter::shared(),
    };

    let result = run(args, reporter).await;

    if let Some(reporter) = indicatif {
        reporter.finish();
    }

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{FAILURE}{} {e:#}", "Error:".red().bold());
            error_exit_code(&e)
        }
    }
}
