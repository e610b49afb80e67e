//! Express automation CLI
//!
//! Usage:
//!   express-automation watch                      # replay workbooks dropped into the watch folder
//!   express-automation run EDS-2025-RR.xlsx       # replay one workbook now
//!   express-automation check EDS-2025-RR.xlsx     # validate and print normalized rows, no typing
//!   express-automation convert export.xls --company EDS --year 2025
//!   express-automation watch-exports              # convert vendor exports as they arrive

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use express_automation::convert::{convert_and_write, Company, ConvertRequest, DEFAULT_SUFFIX};
use express_automation::platforms::{create_backend, create_popup_detector};
use express_automation::{
    load_dataset, parse_company_tag, AppConfig, DispatchContext, DispatchOutcome, Dispatcher,
    DispatcherOptions, Keyboard, Pacing, ProcessLauncher, RunSummary, Workflow,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod exports;
mod prompt;
mod watcher;

#[derive(Parser)]
#[command(name = "express-automation")]
#[command(about = "Replays spreadsheet rows into the Express accounting application")]
struct Cli {
    /// Path to express.config.json
    #[arg(long, global = true, env = "EXPRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Also write daily rolling log files into this folder
    #[arg(long, global = true, env = "EXPRESS_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the template folder and replay each new workbook
    Watch {
        /// Folder to watch (defaults to the configured watch_folder)
        folder: Option<PathBuf>,
        /// Express executable, overriding EXPRESS_PATH and the config
        #[arg(long)]
        express_path: Option<PathBuf>,
    },
    /// Replay one workbook immediately
    Run {
        file: PathBuf,
        /// Company selection key, e.g. EDS2025 (derived from the file name if omitted)
        #[arg(long)]
        search_key: Option<String>,
        #[arg(long)]
        express_path: Option<PathBuf>,
    },
    /// Validate a workbook and print its normalized rows without typing anything
    Check { file: PathBuf },
    /// Convert a vendor export into a template workbook
    Convert {
        /// Export file, or an unpacked download folder
        input: PathBuf,
        /// EDS or FIX
        #[arg(long)]
        company: String,
        /// Four-digit year
        #[arg(long)]
        year: String,
        #[arg(long, default_value = DEFAULT_SUFFIX)]
        suffix: String,
        /// Output folder (defaults to the configured watch_folder)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Watch the incoming folder and convert exports after asking on the console
    WatchExports,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = match init_logging(cli.log_dir.as_deref(), cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            None
        }
    };

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "express-automation.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Logger already initialized")?;
    Ok(guard)
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Watch {
            folder,
            express_path,
        } => watch(config, folder, express_path).await,
        Commands::Run {
            file,
            search_key,
            express_path,
        } => run_once(config, &file, search_key, express_path).await,
        Commands::Check { file } => check(&file),
        Commands::Convert {
            input,
            company,
            year,
            suffix,
            out,
        } => {
            let company: Company = company.parse()?;
            let request = ConvertRequest::new(company, &year, &suffix)?;
            let target_dir = out.unwrap_or_else(|| config.watch_folder.clone());
            let target = convert_and_write(&input, &request, &target_dir, &config.branch_map)?;
            println!("{}", target.display());
            Ok(())
        }
        Commands::WatchExports => exports::watch_exports(config).await,
    }
}

fn build_workflow(config: &AppConfig, express_path: Option<PathBuf>) -> Result<Workflow> {
    let backend = create_backend()?;
    let keyboard = Keyboard::new(backend, Pacing::default());
    let detector = create_popup_detector(&config.popup_window_title);
    Ok(
        Workflow::new(config.clone(), keyboard, detector, Arc::new(ProcessLauncher))
            .with_express_path(express_path),
    )
}

async fn watch(
    mut config: AppConfig,
    folder: Option<PathBuf>,
    express_path: Option<PathBuf>,
) -> Result<()> {
    if let Some(folder) = folder {
        config.watch_folder = folder;
    }
    let folder = config.watch_folder.clone();
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create {}", folder.display()))?;

    let workflow = Arc::new(build_workflow(&config, express_path)?);
    let options = DispatcherOptions {
        archive_dir: config.archive_dir.clone(),
        ..Default::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(DispatchContext::new(), workflow, options));

    let (_watcher, mut events) = watcher::watch_folder(&folder)?;
    info!("Watching folder: {}", folder.display());
    info!("Drop Excel files (.xlsx / .xls) here to trigger automation.");
    info!("Move the pointer to the top-left screen corner to abort a run.");

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                // one task per event so a busy run skips instead of queueing
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let path = event.path.clone();
                    report(&path, dispatcher.handle(event).await);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                break;
            }
        }
    }
    Ok(())
}

fn report(path: &Path, outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Skipped(reason) => debug!("Skipped {}: {:?}", path.display(), reason),
        DispatchOutcome::Rejected(e) => {
            error!("Rejected {}: {}", path.display(), e);
            error!("Required columns: Dept, Date, Supplier, Invoice, Code, Qty, UnitCost");
        }
        DispatchOutcome::Failed(e) => error!("Automation failed for {}: {}", path.display(), e),
        DispatchOutcome::Completed {
            summary,
            archived_to,
        } => {
            log_summary(&summary);
            if let Some(dest) = archived_to {
                info!("Archived to {}", dest.display());
            }
        }
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Run finished: {} attempted, {} succeeded, {} failed",
        summary.attempted, summary.succeeded, summary.failed
    );
    for failed in summary.rows.iter().filter(|r| !r.outcome.is_success()) {
        warn!("Row {} (invoice {}) failed: {:?}", failed.row, failed.invoice, failed.outcome);
    }
}

async fn run_once(
    config: AppConfig,
    file: &Path,
    search_key: Option<String>,
    express_path: Option<PathBuf>,
) -> Result<()> {
    if !file.exists() {
        bail!("Input file not found: {}", file.display());
    }
    // report a bad layout before Express is started
    let dataset = load_dataset(file)?;
    info!("{} rows detected in {}", dataset.rows.len(), file.display());
    let search_key = search_key.or_else(|| parse_company_tag(file).map(|t| t.search_key()));
    let workflow = build_workflow(&config, express_path)?;

    let summary = workflow.run(file, search_key.as_deref()).await?;
    log_summary(&summary);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.failed > 0 {
        bail!("{} of {} rows failed", summary.failed, summary.attempted);
    }
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let dataset = load_dataset(file)?;
    info!("{} rows detected in {}", dataset.rows.len(), file.display());
    match parse_company_tag(file) {
        Some(tag) => info!("Search key: {}", tag.search_key()),
        None => info!("No COMPANY-YYYY tag in file name"),
    }
    println!("{}", serde_json::to_string_pretty(&dataset.canonical_rows())?);
    Ok(())
}
