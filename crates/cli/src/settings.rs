//! Runtime settings: environment loading, the optional TOML settings file,
//! and the dev/prod target table mapping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::CliError;

/// Env file read from the working directory when present.
pub const LOCAL_ENV_FILE: &str = ".env.local";
/// Names a secondary env file shared with a sibling project.
pub const SECONDARY_ENV_VAR: &str = "MARKETING_ROI_ENV_PATH";

pub const DEFAULT_ACTOR: &str = "sync@zoho-reconciliation";

/// Which lead-store tables a command works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetEnv {
    Dev,
    Prod,
}

impl TargetEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

// ── Environment ─────────────────────────────────────────────────────

/// Load env files without overriding variables already set in the process.
///
/// Order: `.env.local` in the working directory, then the file named by
/// `MARKETING_ROI_ENV_PATH`, then `--env-file`. Earlier files win because
/// dotenvy never overrides a variable that is already set.
pub fn load_env(explicit: Option<&Path>) -> Result<Vec<PathBuf>, CliError> {
    let mut loaded = Vec::new();

    let local = PathBuf::from(LOCAL_ENV_FILE);
    if local.is_file() {
        dotenvy::from_path(&local).map_err(|e| env_file_error(&local, e))?;
        loaded.push(local);
    }

    if let Ok(secondary) = std::env::var(SECONDARY_ENV_VAR) {
        let path = PathBuf::from(shellexpand::tilde(&secondary).to_string());
        if !secondary.trim().is_empty() && path.is_file() {
            dotenvy::from_path(&path).map_err(|e| env_file_error(&path, e))?;
            loaded.push(path);
        }
    }

    if let Some(path) = explicit {
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
        if !path.is_file() {
            return Err(CliError::args(format!("env file not found: {}", path.display())));
        }
        dotenvy::from_path(&path).map_err(|e| env_file_error(&path, e))?;
        loaded.push(path);
    }

    for p in &loaded {
        log::debug!("loaded environment from {}", p.display());
    }
    Ok(loaded)
}

fn env_file_error(path: &Path, e: dotenvy::Error) -> CliError {
    CliError::config(format!("cannot load env file {}: {}", path.display(), e))
}

// ── Settings file ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub source: SourceSettings,
    pub store: StoreSettings,
    pub targets: TargetsSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceSettings {
    /// Records requested per page.
    pub page_size: u32,
    /// Hard stop on paging.
    pub max_pages: u32,
    /// Default look-back window in days.
    pub days: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreSettings {
    pub timeout_secs: u64,
    /// Actor tag recorded on every audit event.
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TargetsSettings {
    pub dev: TargetTables,
    pub prod: TargetTables,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetTables {
    pub leads: String,
    pub events: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_pages: 50,
            days: 30,
            timeout_secs: 30,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

impl Default for TargetsSettings {
    fn default() -> Self {
        Self {
            dev: TargetTables {
                leads: "dev_leads".to_string(),
                events: "dev_lead_events".to_string(),
            },
            prod: TargetTables {
                leads: "leads".to_string(),
                events: "lead_events".to_string(),
            },
        }
    }
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    pub fn from_toml(input: &str) -> Result<Self, CliError> {
        let settings: Settings = toml::from_str(input)
            .map_err(|e| CliError::config(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read the settings file, or defaults when none was given.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CliError::config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content).map_err(|e| CliError {
            message: format!("{}: {}", path.display(), e.message),
            ..e
        })
    }

    fn validate(&self) -> Result<(), CliError> {
        let bad = |msg: &str| CliError::config(format!("invalid settings: {}", msg));
        if self.source.page_size == 0 || self.source.page_size > 200 {
            return Err(bad("source.page_size must be between 1 and 200"));
        }
        if self.source.max_pages == 0 {
            return Err(bad("source.max_pages must be at least 1"));
        }
        if self.store.actor.trim().is_empty() {
            return Err(bad("store.actor must not be empty"));
        }
        for (name, t) in [("dev", &self.targets.dev), ("prod", &self.targets.prod)] {
            if t.leads.trim().is_empty() || t.events.trim().is_empty() {
                return Err(bad(&format!("targets.{} table names must not be empty", name)));
            }
        }
        Ok(())
    }

    pub fn tables(&self, target: TargetEnv) -> &TargetTables {
        match target {
            TargetEnv::Dev => &self.targets.dev,
            TargetEnv::Prod => &self.targets.prod,
        }
    }
}
