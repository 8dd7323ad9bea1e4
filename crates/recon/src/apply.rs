//! Applying planned intents through a pluggable store writer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::UpdateIntent;

/// A single intent the store refused or failed to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyError {
    pub target_id: String,
    pub message: String,
}

impl ApplyError {
    pub fn new(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target_id, self.message)
    }
}

impl std::error::Error for ApplyError {}

/// Writes one intent to the target store.
///
/// Implementations perform the status change, the notes write and the
/// source-link write for the intent, then record an audit event. Failure to
/// record the audit event is not an apply failure.
pub trait UpdateApplier {
    fn apply(&mut self, intent: &UpdateIntent) -> Result<(), ApplyError>;
}

impl<A: UpdateApplier + ?Sized> UpdateApplier for &mut A {
    fn apply(&mut self, intent: &UpdateIntent) -> Result<(), ApplyError> {
        (**self).apply(intent)
    }
}

/// Tally of an apply pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// True only when every attempted intent succeeded.
    pub success: bool,
    pub updates_attempted: usize,
    pub updates_succeeded: usize,
    pub updates_failed: usize,
    pub errors: Vec<ApplyError>,
}

/// Apply every intent in order. One failure never aborts the rest.
pub fn apply_all<A: UpdateApplier>(intents: &[UpdateIntent], mut applier: A) -> SyncOutcome {
    let mut outcome = SyncOutcome {
        updates_attempted: intents.len(),
        ..SyncOutcome::default()
    };

    for intent in intents {
        match applier.apply(intent) {
            Ok(()) => {
                outcome.updates_succeeded += 1;
                log::debug!("applied update to {} ({})", intent.target_id, intent.lead_name);
            }
            Err(e) => {
                log::warn!("failed to update {}: {}", intent.lead_name, e.message);
                outcome.updates_failed += 1;
                outcome.errors.push(e);
            }
        }
    }

    outcome.success = outcome.updates_failed == 0;
    outcome
}

/// Accepts every intent without touching a store; records what it saw.
#[derive(Debug, Default)]
pub struct DryRunApplier {
    pub seen: Vec<String>,
}

impl DryRunApplier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UpdateApplier for DryRunApplier {
    fn apply(&mut self, intent: &UpdateIntent) -> Result<(), ApplyError> {
        log::info!(
            "dry run: {} {} -> {}",
            intent.lead_name,
            intent.old_status,
            intent.resulting_status()
        );
        self.seen.push(intent.target_id.clone());
        Ok(())
    }
}
