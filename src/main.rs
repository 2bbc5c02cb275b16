//! biblio-harvest CLI: incremental bibliographic metadata harvester.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};

use biblio_harvest::cancel::CancelToken;
use biblio_harvest::checkpoint::{Checkpoint, CheckpointStore, RedbCheckpointStore};
use biblio_harvest::client::HttpSource;
use biblio_harvest::config::HarvestConfig;
use biblio_harvest::harvest::{HarvestOptions, Harvester, RunState, StartMode, harvest_scopes};
use biblio_harvest::model::{HarvestScope, Watermark};
use biblio_harvest::paths::{HarvestPaths, database_in};
use biblio_harvest::store::{RecordStore, RedbRecordStore, open_database};

#[derive(Parser)]
#[command(
    name = "biblio-harvest",
    version,
    about = "Incremental bibliographic metadata harvester"
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/biblio-harvest/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding the harvest database.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest one or more scopes from the configured source.
    Harvest(HarvestArgs),

    /// Show stored harvest checkpoints.
    Status {
        /// Only this scope.
        #[arg(long)]
        scope: Option<String>,
    },

    /// Print a stored record as JSON.
    Show {
        /// Record identifier (e.g. 2401.00001).
        id: String,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Args)]
struct HarvestArgs {
    /// Scope to harvest (repeatable; default: all).
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// Ignore the stored watermark and harvest everything.
    #[arg(long, conflicts_with = "resume")]
    full: bool,

    /// Continue from the stored cursor of an interrupted run.
    #[arg(long)]
    resume: bool,

    /// Harvest records modified on or after this date (YYYY-MM-DD).
    #[arg(long)]
    from: Option<Watermark>,

    /// Harvest records modified on or before this date (YYYY-MM-DD).
    #[arg(long)]
    until: Option<Watermark>,

    /// Records per store batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop after this many records (0 = unlimited).
    #[arg(long)]
    max_records: Option<u64>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = HarvestPaths::resolve()?;
    let mut config = match &cli.config {
        Some(path) => HarvestConfig::load(path)?,
        None => HarvestConfig::load_or_default(&paths.config_file())?,
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    let paths = match &config.storage.data_dir {
        Some(dir) => paths.with_data_dir(dir),
        None => paths,
    };

    match cli.command {
        Commands::Harvest(args) => run_harvest(args, config, &paths)?,

        Commands::Status { scope } => {
            let db = open_database(&database_in(&paths.data_dir))?;
            let checkpoints = RedbCheckpointStore::new(db)?;
            let list = match scope {
                Some(name) => vec![checkpoints.load(&HarvestScope::named(&name))?],
                None => checkpoints.list()?,
            };
            if list.is_empty() {
                println!("No harvests recorded.");
            }
            for cp in &list {
                print_checkpoint(cp);
            }
        }

        Commands::Show { id } => {
            let db = open_database(&database_in(&paths.data_dir))?;
            let records = RedbRecordStore::new(db)?;
            match records.get(&id)? {
                Some(record) => {
                    let json = serde_json::to_string_pretty(&record).into_diagnostic()?;
                    println!("{json}");
                }
                None => miette::bail!("no record stored under \"{id}\""),
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn run_harvest(args: HarvestArgs, mut config: HarvestConfig, paths: &HarvestPaths) -> Result<()> {
    if let Some(n) = args.batch_size {
        config.harvest.batch_size = n;
    }
    if let Some(n) = args.max_records {
        config.harvest.max_records = n;
    }
    config.validate()?;

    paths.ensure_data_dir()?;
    let db = open_database(&paths.database_file())?;
    let records = RedbRecordStore::new(Arc::clone(&db))?;
    let checkpoints = RedbCheckpointStore::new(db)?;
    let source = HttpSource::new(&config.source);

    let cancel = CancelToken::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag()).into_diagnostic()?;
    }

    let mut options = HarvestOptions::from_config(&config);
    options.mode = if args.full {
        StartMode::Full
    } else if args.resume {
        StartMode::Resume
    } else {
        StartMode::Incremental
    };
    options.from = args.from;
    options.until = args.until;

    let scopes: Vec<HarvestScope> = if args.scopes.is_empty() {
        vec![HarvestScope::all()]
    } else {
        args.scopes.iter().map(|s| HarvestScope::named(s)).collect()
    };

    let harvester = Harvester::new(&source, &checkpoints, &records, options);
    let mut failed = 0;
    for result in harvest_scopes(&harvester, &scopes, &cancel) {
        let summary = result?;
        let s = &summary.stats;
        println!(
            "{}: {} ({}) pages={} fetched={} inserted={} updated={} deleted={} skipped={} in {:.1}s",
            summary.scope,
            summary.state,
            summary.stop_reason,
            s.pages,
            s.fetched,
            s.inserted,
            s.updated,
            s.deleted,
            s.skipped,
            summary.elapsed.as_secs_f64()
        );
        if summary.state == RunState::Failed {
            failed += 1;
        }
    }
    println!("{} records stored.", records.len()?);

    if failed > 0 {
        miette::bail!("{failed} scope(s) failed; rerun with --resume to continue");
    }
    Ok(())
}

fn print_checkpoint(cp: &Checkpoint) {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
    };
    println!("Scope: {}", cp.scope);
    println!("  status:      {}", cp.status);
    println!("  harvested:   {}", cp.total_harvested);
    println!(
        "  watermark:   {}",
        cp.last_watermark
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "  resumable:   {}",
        if cp.continuation_cursor.is_some() { "yes" } else { "no" }
    );
    println!("  started:     {}", fmt_time(cp.started_at));
    println!("  completed:   {}", fmt_time(cp.completed_at));
    println!("  updated:     {}", fmt_time(cp.updated_at));
}
