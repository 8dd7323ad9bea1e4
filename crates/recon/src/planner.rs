//! Update planning: turns reconciled pairs into target-store mutations.

use serde::Serialize;

use crate::model::{MatchResult, TargetRecord, UpdateIntent};
use crate::status::{self, CanonicalStatus};

/// Why a matched pair produced no intent despite qualifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanWarning {
    pub source_id: String,
    pub lead_name: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdatePlan {
    pub intents: Vec<UpdateIntent>,
    pub warnings: Vec<PlanWarning>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn status_change_count(&self) -> usize {
        self.intents.iter().filter(|u| u.changes_status()).count()
    }

    pub fn with_notes_count(&self) -> usize {
        self.intents.iter().filter(|u| u.notes.is_some()).count()
    }
}

/// Derive update intents from reconciled pairs.
///
/// A matched pair qualifies when its status differs, or, with
/// `include_notes_only`, when the source carries non-blank notes. A
/// qualifying pair whose source status is outside the canonical vocabulary
/// is dropped whole (status, notes and link together) with a warning.
pub fn plan_updates(matches: &[MatchResult], include_notes_only: bool) -> UpdatePlan {
    let mut plan = UpdatePlan::default();

    for m in matches {
        let Some(target) = m.target.as_ref() else {
            continue;
        };

        let has_notes = m.source.trimmed_notes().is_some();
        if !(m.status_differs || (include_notes_only && has_notes)) {
            continue;
        }

        let Some(new_status) = CanonicalStatus::from_key(&m.source.status) else {
            log::warn!(
                "unknown status '{}' for lead {}, skipping",
                m.source.status,
                m.source.name
            );
            plan.warnings.push(PlanWarning {
                source_id: m.source.id.clone(),
                lead_name: m.source.name.clone(),
                status: m.source.status.clone(),
                message: format!(
                    "status '{}' (label '{}') is not in the canonical vocabulary",
                    m.source.status, m.source.status_raw
                ),
            });
            continue;
        };

        plan.intents.push(UpdateIntent {
            target_id: target.id.clone(),
            lead_name: m.source.name.clone(),
            old_status: target.status.clone(),
            new_status: m.status_differs.then_some(new_status),
            notes: has_notes.then(|| m.source.notes.clone()).flatten(),
            source_id: m.source.id.clone(),
            match_type: m.match_type,
            match_confidence: m.match_confidence,
        });
    }

    plan
}

/// A deprecated status on a target record and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationIntent {
    pub target_id: String,
    pub lead_name: String,
    pub old_status: String,
    pub new_status: CanonicalStatus,
}

/// Plan the fold of deprecated store statuses into their replacements.
pub fn plan_migrations(targets: &[TargetRecord]) -> Vec<MigrationIntent> {
    targets
        .iter()
        .filter_map(|t| {
            status::legacy_replacement(&t.status).map(|new_status| MigrationIntent {
                target_id: t.id.clone(),
                lead_name: t.name.clone(),
                old_status: t.status.clone(),
                new_status,
            })
        })
        .collect()
}
