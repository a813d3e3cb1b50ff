//! CLI command implementations
//!
//! Commands are thin glue: load the configuration, wire the subsystems,
//! run one engine operation, and render its structured report as JSON on
//! stdout. Lifecycle events go to stderr as structured log lines; no
//! engine logic lives here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::discard::{self, DiscardSet};
use crate::model::MarkKey;
use crate::observability::{AuditLog, Logger, Severity};
use crate::reconcile::ReconciliationEngine;
use crate::roster::Roster;
use crate::snapshot::{SnapshotArchive, SnapshotManifest};
use crate::store::MarkStore;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Snapshot retention bound (optional, default 50)
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,

    /// Discard set retention bound (optional, default 500)
    #[serde(default = "default_discard_retention")]
    pub discard_retention: usize,
}

fn default_snapshot_retention() -> usize {
    SnapshotArchive::DEFAULT_RETENTION
}
fn default_discard_retention() -> usize {
    discard::DEFAULT_RETENTION
}

impl Config {
    fn load(path: &Path) -> CliResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| CliError::config(format!("malformed {}: {}", path.display(), e)))
    }
}

/// Wired subsystems for one command invocation.
struct Subsystems {
    store: MarkStore,
    roster: Roster,
    discards: DiscardSet,
    audit: AuditLog,
}

fn boot(config: &Config) -> CliResult<Subsystems> {
    let data_dir = Path::new(&config.data_dir);

    let store = MarkStore::open(data_dir, config.snapshot_retention)
        .map_err(|e| CliError::io(e.to_string()))?;
    let roster = Roster::load(data_dir).map_err(|e| CliError::io(e.to_string()))?;
    let discards = DiscardSet::open(data_dir, config.discard_retention);
    let audit = AuditLog::open(data_dir)
        .map_err(|e| CliError::io(format!("cannot open audit log: {}", e)))?;

    Ok(Subsystems {
        store,
        roster,
        discards,
        audit,
    })
}

/// Parse arguments and dispatch.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match cli.command {
        Command::Init { config } => cmd_init(&config),
        Command::Reconcile { config } => cmd_reconcile(&config),
        Command::Dedupe {
            config,
            student,
            exam,
        } => cmd_dedupe(&config, &student, exam.as_deref()),
        Command::Validate { config } => cmd_validate(&config),
        Command::Resolve { config, query } => cmd_resolve(&config, &query),
        Command::Snapshots { config } => cmd_snapshots(&config),
        Command::ExportDiscards { config } => cmd_export_discards(&config),
    }
}

fn cmd_init(config_path: &Path) -> CliResult<()> {
    // A missing config file is created with defaults on init only
    if !config_path.exists() {
        let default = Config {
            data_dir: "./data".to_string(),
            snapshot_retention: default_snapshot_retention(),
            discard_retention: default_discard_retention(),
        };
        let json = serde_json::to_string_pretty(&default)
            .map_err(|e| CliError::config(format!("default config failed to serialize: {}", e)))?;
        fs::write(config_path, json).map_err(|e| {
            CliError::io(format!("cannot write {}: {}", config_path.display(), e))
        })?;
    }

    let config = Config::load(config_path)?;
    let data_dir = Path::new(&config.data_dir);

    let store = MarkStore::open(data_dir, config.snapshot_retention)
        .map_err(|e| CliError::io(e.to_string()))?;
    let guard = store.turnstile().enter();
    store
        .initialize(&guard)
        .map_err(|e| CliError::io(e.to_string()))?;
    drop(guard);

    for roster_file in ["students.json", "exams.json"] {
        let path = data_dir.join(roster_file);
        if !path.exists() {
            fs::write(&path, "[]")
                .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))?;
        }
    }

    Logger::log_stderr(
        Severity::Info,
        "initialized",
        &[("data_dir", &config.data_dir)],
    );
    Ok(())
}

fn cmd_reconcile(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;
    let engine = ReconciliationEngine::new(
        &subsystems.store,
        &subsystems.roster,
        &subsystems.discards,
        &subsystems.audit,
    );

    let report = engine.reconcile().map_err(|e| CliError::engine(e.to_string()))?;
    Logger::log_stderr(
        Severity::Info,
        "reconcile_finished",
        &[
            ("recovered", &report.recovered.to_string()),
            ("rejected", &report.rejected.to_string()),
        ],
    );
    print_report(&report)
}

fn cmd_dedupe(config_path: &Path, student: &str, exam: Option<&str>) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;
    let engine = ReconciliationEngine::new(
        &subsystems.store,
        &subsystems.roster,
        &subsystems.discards,
        &subsystems.audit,
    );

    match exam {
        Some(exam) => {
            let key = MarkKey::new(student, exam);
            let report = engine
                .dedupe(&key)
                .map_err(|e| CliError::engine(e.to_string()))?;
            print_report(&report)
        }
        None => {
            let report = engine
                .dedupe_student(student)
                .map_err(|e| CliError::engine(e.to_string()))?;
            print_report(&report)
        }
    }
}

fn cmd_validate(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;
    let engine = ReconciliationEngine::new(
        &subsystems.store,
        &subsystems.roster,
        &subsystems.discards,
        &subsystems.audit,
    );

    let report = engine.validate().map_err(|e| CliError::engine(e.to_string()))?;
    print_report(&report)
}

fn cmd_resolve(config_path: &Path, query: &str) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;
    let engine = ReconciliationEngine::new(
        &subsystems.store,
        &subsystems.roster,
        &subsystems.discards,
        &subsystems.audit,
    );

    let resolution = engine.resolve_identity(query);
    print_report(&resolution)
}

fn cmd_snapshots(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;

    let archive = subsystems.store.archive();
    let ids = archive
        .list()
        .map_err(|e| CliError::engine(e.to_string()))?;

    let mut manifests: Vec<SnapshotManifest> = Vec::with_capacity(ids.len());
    for id in &ids {
        let path = archive.snapshots_dir().join(id).join("manifest.json");
        manifests.push(
            SnapshotManifest::read_from_file(&path)
                .map_err(|e| CliError::engine(e.to_string()))?,
        );
    }
    print_report(&manifests)
}

fn cmd_export_discards(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let subsystems = boot(&config)?;

    let archive_path = subsystems
        .discards
        .export_all()
        .map_err(|e| CliError::engine(e.to_string()))?;
    print_report(&serde_json::json!({ "exported_to": archive_path }))
}

fn print_report<T: Serialize>(report: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| CliError::io(format!("report failed to serialize: {}", e)))?;
    println!("{}", json);
    Ok(())
}
