// leadsync - reconcile CRM leads with the lead store and push status updates

mod commands;
mod exit_codes;
mod fetch;
mod report;
mod settings;
mod snapshot;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use exit_codes::{EXIT_CONFIG, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};
use settings::{Settings, TargetEnv};

#[derive(Parser)]
#[command(name = "leadsync")]
#[command(about = "Reconcile CRM leads with the lead store and sync statuses")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (TOML). Defaults to ./leadsync.toml when present
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra env file, loaded after .env.local and $MARKETING_ROI_ENV_PATH
    #[arg(long, global = true, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG overrides
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match CRM leads against the lead store and report differences
    #[command(after_help = "\
Examples:
  leadsync reconcile
  leadsync reconcile --target prod --days 7
  leadsync reconcile --output report.json
  leadsync reconcile --json | jq '.summary'
  leadsync reconcile --source-snapshot zoho.json --target-snapshot leads.json")]
    Reconcile {
        /// Lead-store tables to read
        #[arg(long, value_enum, default_value = "dev")]
        target: TargetEnv,

        /// Look-back window for CRM leads (default from settings, 30)
        #[arg(long)]
        days: Option<u32>,

        /// Write the full report as JSON
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the full report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Read CRM leads from a JSON snapshot instead of the API
        #[arg(long, value_name = "FILE")]
        source_snapshot: Option<PathBuf>,

        /// Read store leads from a JSON snapshot instead of the API
        #[arg(long, value_name = "FILE")]
        target_snapshot: Option<PathBuf>,
    },

    /// Push CRM statuses (and optionally notes) to matched store leads
    #[command(after_help = "\
Examples:
  leadsync sync --dry-run
  leadsync sync --target prod
  leadsync sync --target prod --force --output sync-log.json
  leadsync sync --sync-notes --dry-run
  leadsync sync --dry-run --source-snapshot zoho.json --target-snapshot leads.json

Exit codes:
  70  some updates failed (see the error list and the sync log)
  71  no CRM leads in the window")]
    Sync {
        /// Show and count the updates without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Lead-store tables to update
        #[arg(long, value_enum, default_value = "dev")]
        target: TargetEnv,

        /// Look-back window for CRM leads (default from settings, 30)
        #[arg(long)]
        days: Option<u32>,

        /// Write a sync log (JSON)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,

        /// Also update leads whose status already agrees, to copy CRM notes
        #[arg(long)]
        sync_notes: bool,

        /// Read CRM leads from a JSON snapshot (requires --dry-run)
        #[arg(long, value_name = "FILE")]
        source_snapshot: Option<PathBuf>,

        /// Read store leads from a JSON snapshot (requires --dry-run)
        #[arg(long, value_name = "FILE")]
        target_snapshot: Option<PathBuf>,
    },

    /// Move store leads off legacy statuses (new, customer, lost)
    #[command(after_help = "\
Examples:
  leadsync migrate-statuses --dry-run
  leadsync migrate-statuses --target prod")]
    MigrateStatuses {
        /// Lead-store tables to migrate
        #[arg(long, value_enum, default_value = "dev")]
        target: TargetEnv,

        /// List the migrations without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show how phone numbers normalize
    #[command(after_help = "\
Examples:
  leadsync phone '+972-50-123-4567'
  leadsync phone 0501234567 501234567 --json")]
    Phone {
        /// Raw phone numbers
        #[arg(required = true)]
        numbers: Vec<String>,

        /// Print JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  leadsync-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    // phone needs neither credentials nor settings
    if let Commands::Phone { numbers, json } = &cli.command {
        return commands::cmd_phone(numbers, *json);
    }

    settings::load_env(cli.env_file.as_deref())?;
    let settings = Settings::load(commands::settings_path(cli.config).as_deref())?;

    match cli.command {
        Commands::Reconcile {
            target,
            days,
            output,
            json,
            source_snapshot,
            target_snapshot,
        } => commands::cmd_reconcile(
            &settings,
            commands::ReconcileArgs {
                target,
                days,
                output,
                json,
                source_snapshot,
                target_snapshot,
            },
        ),
        Commands::Sync {
            dry_run,
            target,
            days,
            output,
            force,
            sync_notes,
            source_snapshot,
            target_snapshot,
        } => commands::cmd_sync(
            &settings,
            commands::SyncArgs {
                target,
                days,
                output,
                dry_run,
                force,
                sync_notes,
                source_snapshot,
                target_snapshot,
            },
        ),
        Commands::MigrateStatuses { target, dry_run } => {
            commands::cmd_migrate_statuses(&settings, target, dry_run)
        }
        Commands::Phone { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
