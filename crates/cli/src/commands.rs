//! Subcommand implementations. Each loads its inputs, runs the engine and
//! reports on stderr; `main` only parses arguments and maps errors to exit
//! codes.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use leadsync_recon::{
    apply_all, phone, plan_migrations, plan_updates, reconcile, DryRunApplier,
    ReconciliationReport, ReportDocument, SourceRecord, TargetRecord,
};

use crate::exit_codes;
use crate::fetch::zoho::{self, LoadOptions, ZohoCredentials, ZohoSession};
use crate::report::{self, SyncLog};
use crate::settings::{Settings, TargetEnv};
use crate::snapshot;
use crate::store::{self, StoreApplier, StoreClient, StoreCredentials};
use crate::CliError;

// ── Inputs ──────────────────────────────────────────────────────────

/// Where source records come from for this run.
enum SourceInput {
    Snapshot(PathBuf),
    Live(ZohoCredentials),
}

impl SourceInput {
    fn resolve(snapshot: Option<PathBuf>) -> Result<Self, CliError> {
        match snapshot {
            Some(path) => Ok(Self::Snapshot(path)),
            None => Ok(Self::Live(ZohoCredentials::from_env()?)),
        }
    }

    fn load(self, settings: &Settings, days: u32, quiet: bool) -> Result<Vec<SourceRecord>, CliError> {
        match self {
            Self::Snapshot(path) => snapshot::read_source(&path),
            Self::Live(creds) => {
                let configured = std::env::var(zoho::ENV_REGION).ok();
                let regions = zoho::candidate_regions(configured.as_deref());
                let mut session = ZohoSession::new(creds, regions, settings.source.timeout())?;
                let opts = LoadOptions {
                    page_size: settings.source.page_size,
                    max_pages: settings.source.max_pages,
                    cutoff: zoho::cutoff_for(days, Local::now().naive_local()),
                    quiet,
                };
                if !quiet {
                    eprintln!("loading CRM leads from the last {} days...", days);
                }
                let leads = zoho::load_leads(&mut session, &opts)?;
                log::debug!("CRM region: {}", session.region().unwrap_or("-"));
                Ok(leads)
            }
        }
    }
}

/// Where target records come from; a live store is kept for writing.
enum TargetInput {
    Snapshot(PathBuf),
    Live(StoreClient),
}

impl TargetInput {
    fn resolve(
        snapshot: Option<PathBuf>,
        settings: &Settings,
        target: TargetEnv,
    ) -> Result<Self, CliError> {
        match snapshot {
            Some(path) => Ok(Self::Snapshot(path)),
            None => Ok(Self::Live(connect_store(settings, target)?)),
        }
    }

    fn load(&self, quiet: bool) -> Result<Vec<TargetRecord>, CliError> {
        match self {
            Self::Snapshot(path) => snapshot::read_target(path),
            Self::Live(store) => {
                if !quiet {
                    eprintln!("loading leads from {}...", store.tables().leads);
                }
                store.load_leads(quiet)
            }
        }
    }
}

fn connect_store(settings: &Settings, target: TargetEnv) -> Result<StoreClient, CliError> {
    let creds = StoreCredentials::from_env()?;
    log::info!("lead store target: {}", target.as_str());
    StoreClient::new(creds, settings.tables(target).clone(), settings.store.timeout())
}

/// Credentials for both sides are checked before anything is loaded.
fn load_both(
    settings: &Settings,
    target: TargetEnv,
    days: u32,
    source_snapshot: Option<PathBuf>,
    target_snapshot: Option<PathBuf>,
    quiet: bool,
) -> Result<(Vec<SourceRecord>, Vec<TargetRecord>, TargetInput), CliError> {
    let source = SourceInput::resolve(source_snapshot)?;
    let target_input = TargetInput::resolve(target_snapshot, settings, target)?;

    let sources = source.load(settings, days, quiet)?;
    let targets = target_input.load(quiet)?;
    Ok((sources, targets, target_input))
}

fn run_reconcile(sources: &[SourceRecord], targets: &[TargetRecord]) -> ReconciliationReport {
    let report = reconcile(sources, targets);
    eprint!("{}", report::render_report(&report));
    report
}

// ── reconcile ───────────────────────────────────────────────────────

pub struct ReconcileArgs {
    pub target: TargetEnv,
    pub days: Option<u32>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub source_snapshot: Option<PathBuf>,
    pub target_snapshot: Option<PathBuf>,
}

pub fn cmd_reconcile(settings: &Settings, args: ReconcileArgs) -> Result<(), CliError> {
    let days = args.days.unwrap_or(settings.source.days);
    let (sources, targets, _) = load_both(
        settings,
        args.target,
        days,
        args.source_snapshot,
        args.target_snapshot,
        args.json,
    )?;

    let doc = ReportDocument::new(run_reconcile(&sources, &targets), Utc::now());

    if let Some(path) = &args.output {
        report::save_report(path, &doc)?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        let json = doc.to_json().map_err(|e| CliError {
            code: exit_codes::EXIT_ERROR,
            message: e.to_string(),
            hint: None,
        })?;
        println!("{json}");
    }

    Ok(())
}

// ── sync ────────────────────────────────────────────────────────────

pub struct SyncArgs {
    pub target: TargetEnv,
    pub days: Option<u32>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
    pub force: bool,
    pub sync_notes: bool,
    pub source_snapshot: Option<PathBuf>,
    pub target_snapshot: Option<PathBuf>,
}

pub fn cmd_sync(settings: &Settings, args: SyncArgs) -> Result<(), CliError> {
    if !args.dry_run && (args.source_snapshot.is_some() || args.target_snapshot.is_some()) {
        return Err(CliError::args("snapshots can only be used with --dry-run")
            .with_hint("a live sync always reads both sides fresh"));
    }

    let days = args.days.unwrap_or(settings.source.days);
    let (sources, targets, target_input) = load_both(
        settings,
        args.target,
        days,
        args.source_snapshot,
        args.target_snapshot,
        false,
    )?;

    if sources.is_empty() {
        return Err(CliError {
            code: exit_codes::EXIT_SYNC_EMPTY,
            message: format!("no CRM leads found in the last {} days", days),
            hint: Some("widen the window with --days".to_string()),
        });
    }

    let report = run_reconcile(&sources, &targets);
    let plan = plan_updates(&report.matches, args.sync_notes);
    eprintln!();
    eprint!("{}", report::render_pending(&plan));

    if plan.is_empty() {
        eprintln!("nothing to update");
        return Ok(());
    }

    let outcome = if args.dry_run {
        apply_all(&plan.intents, DryRunApplier::new())
    } else {
        let TargetInput::Live(store) = &target_input else {
            return Err(CliError::args("a live sync needs the lead store"));
        };
        if !args.force {
            let prompt = format!(
                "apply {} updates to {}?",
                plan.intents.len(),
                store.tables().leads
            );
            if !confirm(&mut std::io::stdin().lock(), &mut std::io::stderr(), &prompt)? {
                eprintln!("Aborted.");
                return Ok(());
            }
        }
        let applier = StoreApplier::new(
            store,
            settings.store.actor.clone(),
            plan.intents.len(),
            false,
        );
        apply_all(&plan.intents, applier)
    };

    eprintln!();
    eprint!("{}", report::render_outcome(&outcome, args.dry_run));

    if let Some(path) = &args.output {
        report::save_sync_log(
            path,
            &SyncLog {
                timestamp: Utc::now(),
                result: &outcome,
                updates: &plan.intents,
            },
        )?;
        eprintln!("wrote {}", path.display());
    }

    if outcome.updates_failed > 0 {
        return Err(CliError {
            code: exit_codes::EXIT_SYNC_PARTIAL,
            message: format!(
                "{} of {} updates failed",
                outcome.updates_failed, outcome.updates_attempted
            ),
            hint: None,
        });
    }
    Ok(())
}

/// Ask on `output`, read one line from `input`. Only "yes" proceeds.
pub fn confirm(
    input: &mut impl BufRead,
    output: &mut impl Write,
    prompt: &str,
) -> Result<bool, CliError> {
    write!(output, "{} (yes/no): ", prompt)
        .and_then(|_| output.flush())
        .map_err(|e| CliError::io(e.to_string()))?;
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|e| CliError::io(e.to_string()))?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

// ── migrate-statuses ────────────────────────────────────────────────

pub fn cmd_migrate_statuses(
    settings: &Settings,
    target: TargetEnv,
    dry_run: bool,
) -> Result<(), CliError> {
    let store = connect_store(settings, target)?;
    let leads = store.load_leads(false)?;
    let intents = plan_migrations(&leads);

    if intents.is_empty() {
        eprintln!("no leads with legacy statuses in {}", store.tables().leads);
        return Ok(());
    }

    eprintln!("legacy statuses in {}: {}", store.tables().leads, intents.len());
    for m in &intents {
        eprintln!("  [{}] {}: {} -> {}", m.target_id, m.lead_name, m.old_status, m.new_status);
    }

    if dry_run {
        eprintln!("dry run: nothing written");
        return Ok(());
    }

    let outcome = store::apply_migrations(&store, &intents, false);
    eprint!("{}", report::render_outcome(&outcome, false));
    if outcome.updates_failed > 0 {
        return Err(CliError {
            code: exit_codes::EXIT_SYNC_PARTIAL,
            message: format!(
                "{} of {} migrations failed",
                outcome.updates_failed, outcome.updates_attempted
            ),
            hint: None,
        });
    }
    Ok(())
}

// ── phone ───────────────────────────────────────────────────────────

pub fn cmd_phone(raws: &[String], json: bool) -> Result<(), CliError> {
    let rows: Vec<serde_json::Value> = raws
        .iter()
        .map(|raw| {
            serde_json::json!({
                "input": raw,
                "normalized": phone::normalize(Some(raw.as_str())).map(|p| p.into_string()),
                "variants": phone::variants(Some(raw.as_str())),
            })
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&rows).map_err(|e| CliError {
            code: exit_codes::EXIT_ERROR,
            message: format!("JSON serialization error: {}", e),
            hint: None,
        })?;
        println!("{out}");
        return Ok(());
    }

    for row in &rows {
        let variants: Vec<&str> = row["variants"]
            .as_array()
            .map(|v| v.iter().filter_map(|s| s.as_str()).collect())
            .unwrap_or_default();
        println!(
            "{}\t{}\t{}",
            row["input"].as_str().unwrap_or_default(),
            row["normalized"].as_str().unwrap_or("-"),
            variants.join(","),
        );
    }
    Ok(())
}

/// Settings file path from `--config`, falling back to `leadsync.toml` in
/// the working directory when it exists.
pub fn settings_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = Path::new("leadsync.toml");
        local.is_file().then(|| local.to_path_buf())
    })
}
