use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ban_sweep_rs::config::{ExecutorConfig, ScanConfig, Settings, SETTINGS_FILE_NAME};
use ban_sweep_rs::executor::Executor;
use ban_sweep_rs::remote::{HttpActionSink, HttpLookup, WsPageSource};
use ban_sweep_rs::scanner::{ScanProgress, ScanReport, Scanner, StopReason};
use ban_sweep_rs::types::PersistedRecord;
use ban_sweep_rs::verifier::Verifier;
use ban_sweep_rs::{clock, progress, store};

/// ban-sweep-rs — find stale cheating punishments, re-verify them and issue follow-up bans.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ban-sweep-rs",
    version,
    about = "Find stale cheating punishments, re-verify them and issue follow-up bans.",
    long_about = None
)]
struct Cli {
    /// Path to settings.json. Defaults to ./settings.json, then the executable's directory.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Record store path. Overrides `store_path` from settings and the built-in lookup.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Walk punishment pages and store matching entries.
    Scan {
        /// First page to request.
        #[arg(long = "start-page", default_value_t = 100)]
        start_page: u32,

        /// Number of matching punishments to collect.
        #[arg(long, default_value_t = 10)]
        count: usize,

        /// Stop after this many empty or skipped pages in a row (0 = never).
        #[arg(long = "max-empty-pages", default_value_t = 25)]
        max_empty_pages: u32,

        /// Do not draw the progress line.
        #[arg(long = "no-progress", default_value_t = false)]
        no_progress: bool,
    },
    /// Drop stored players that already carry an active punishment.
    Verify,
    /// Issue follow-up bans for every stored player.
    Ban,
    /// Show page information reported by the service.
    Pages {
        #[arg(long, default_value_t = 0)]
        category: u8,
    },
}

fn main() -> Result<()> {
    // Must run before the runtime spawns worker threads.
    clock::init_local_offset();

    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run(cli))
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to set logging subscriber: {e}"))
}

async fn run(cli: Cli) -> Result<()> {
    // Ctrl-C cancels whichever stage is running.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    match cli.command.clone() {
        Command::Scan {
            start_page,
            count,
            max_empty_pages,
            no_progress,
        } => {
            let settings = load_settings(cli.settings.as_deref(), false)?;
            let store_path = store_path(&cli, settings.as_ref());
            run_scan(
                settings.as_ref(),
                &store_path,
                start_page,
                count,
                max_empty_pages,
                no_progress,
                cancel,
            )
            .await
        }
        Command::Verify => {
            let settings = require_settings(cli.settings.as_deref())?;
            let store_path = store_path(&cli, Some(&settings));
            println!("Checking store: {}", store_path.display());
            let verifier = Verifier::new(HttpLookup::from_settings(&settings)?);
            let summary = verifier.verify_store(&store_path, &cancel).await?;
            println!(
                "Checked: {}, removed: {}, lookup failures: {}",
                summary.checked, summary.removed, summary.lookup_failures
            );
            Ok(())
        }
        Command::Ban => {
            let settings = require_settings(cli.settings.as_deref())?;
            let store_path = store_path(&cli, Some(&settings));
            println!("Banning players from: {}", store_path.display());
            let records = store::load(&store_path)?;
            if records.is_empty() {
                println!("No players found in the store.");
                return Ok(());
            }
            let executor = Executor::new(
                HttpActionSink::from_settings(&settings)?,
                ExecutorConfig::from_settings(&settings),
            );
            let summary = executor.execute(&records, &cancel).await;
            println!(
                "Results: banned {}, skipped {}",
                summary.executed, summary.skipped
            );
            Ok(())
        }
        Command::Pages { category } => {
            let settings = load_settings(cli.settings.as_deref(), false)?;
            let info = page_source(settings.as_ref()).page_info(category).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

async fn run_scan(
    settings: Option<&Settings>,
    store_path: &Path,
    start_page: u32,
    count: usize,
    max_empty_pages: u32,
    no_progress: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut config = ScanConfig {
        max_consecutive_empty_pages: (max_empty_pages > 0).then_some(max_empty_pages),
        ..ScanConfig::default()
    };
    if let Some(s) = settings {
        config.reason_keywords = s.reason_keywords.clone();
    }

    println!("Scanning from page {start_page} for {count} punishment(s)... (Ctrl+C to stop)");

    let (tx, rx) = watch::channel(ScanProgress::default());
    let stop_renderer = CancellationToken::new();
    let renderer = (!no_progress).then(|| progress::spawn_renderer(rx, stop_renderer.clone()));

    let scanner = Scanner::new(page_source(settings), config)
        .with_store(store_path)
        .with_progress(tx);
    let result = scanner.scan(start_page, count, cancel).await;

    stop_renderer.cancel();
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    let report = result?;
    print_report(&report);
    Ok(())
}

fn page_source(settings: Option<&Settings>) -> WsPageSource {
    match settings {
        Some(s) => WsPageSource::new(s.ws_url.clone()).with_access_token(s.access_token.clone()),
        None => WsPageSource::new(ban_sweep_rs::config::DEFAULT_WS_URL),
    }
}

fn settings_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(p) = explicit {
        return vec![p.to_path_buf()];
    }
    let mut paths = vec![PathBuf::from(SETTINGS_FILE_NAME)];
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(SETTINGS_FILE_NAME));
    }
    paths
}

/// Load settings. Without `required`, a missing file yields `None`; a present
/// but malformed file is always an error.
fn load_settings(explicit: Option<&Path>, required: bool) -> Result<Option<Settings>> {
    let candidates = settings_candidates(explicit);
    match candidates.iter().find(|p| p.is_file()) {
        Some(path) => {
            let settings = Settings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?;
            Ok(Some(settings))
        }
        None if required || explicit.is_some() => Err(anyhow!(
            "settings file not found (looked in: {})",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        None => Ok(None),
    }
}

fn require_settings(explicit: Option<&Path>) -> Result<Settings> {
    load_settings(explicit, true)?.ok_or_else(|| anyhow!("settings are required for this stage"))
}

fn store_path(cli: &Cli, settings: Option<&Settings>) -> PathBuf {
    cli.store
        .clone()
        .or_else(|| settings.and_then(|s| s.store_path.clone()))
        .unwrap_or_else(store::locate)
}

fn print_report(report: &ScanReport) {
    match &report.stop {
        StopReason::TargetReached => println!("Target reached."),
        StopReason::Cancelled => println!("Scan stopped by operator."),
        StopReason::SourceExhausted { empty_pages } => {
            println!("No more data: {empty_pages} empty page(s) in a row.")
        }
        StopReason::TransportFailure { page, message } => {
            println!("Scan aborted on page {page}: {message}")
        }
    }
    if report.pages_skipped > 0 {
        println!("Pages skipped after repeated timeouts: {}", report.pages_skipped);
    }
    if report.records.is_empty() {
        println!("No matching punishments found.");
        return;
    }
    print_records_table(&report.records);
    match &report.persisted_to {
        Some(path) => println!("Saved {} record(s) to {}", report.records.len(), path.display()),
        None => println!("Records were not saved."),
    }
    println!("Next page: {}", report.end_page);
}

fn print_records_table(records: &[PersistedRecord]) {
    let mut name_w = "player".len();
    let mut reason_w = "reason".len();
    for r in records {
        name_w = name_w.max(r.name.chars().count().min(32));
        reason_w = reason_w.max(r.reason.chars().count().min(40));
    }
    let id_w = 17usize;
    let date_w = 19usize;

    println!("\nFound: {}", records.len());
    println!(
        "{:<name_w$}  {:<id_w$}  {:<date_w$}  {:<date_w$}  {:<reason_w$}",
        "player",
        "steamid",
        "created",
        "expires",
        "reason",
        name_w = name_w,
        id_w = id_w,
        date_w = date_w,
        reason_w = reason_w
    );
    println!(
        "{:-<name_w$}  {:-<id_w$}  {:-<date_w$}  {:-<date_w$}  {:-<reason_w$}",
        "",
        "",
        "",
        "",
        "",
        name_w = name_w,
        id_w = id_w,
        date_w = date_w,
        reason_w = reason_w
    );
    for r in records {
        let name: String = r.name.chars().take(32).collect();
        let reason: String = r.reason.chars().take(40).collect();
        let expires = r
            .expires
            .map(store::format_timestamp)
            .unwrap_or_else(|| store::PERMANENT.to_string());
        println!(
            "{:<name_w$}  {:<id_w$}  {:<date_w$}  {:<date_w$}  {:<reason_w$}",
            name,
            r.steamid,
            store::format_timestamp(r.created),
            expires,
            reason,
            name_w = name_w,
            id_w = id_w,
            date_w = date_w,
            reason_w = reason_w
        );
    }
}
