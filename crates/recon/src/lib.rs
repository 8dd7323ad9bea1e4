//! `leadsync-recon`: keyless lead reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded source (CRM) and target (lead
//! store) snapshots, links them without a shared key, and plans the field
//! updates that bring the target in line with the source. No network or
//! filesystem dependencies; appliers plug in through [`apply::UpdateApplier`].

pub mod apply;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod phone;
pub mod planner;
pub mod similarity;
pub mod status;
pub mod summary;

pub use apply::{apply_all, ApplyError, DryRunApplier, SyncOutcome, UpdateApplier};
pub use engine::reconcile;
pub use error::ReconError;
pub use matcher::{find_match, MatchOutcome};
pub use model::{
    MatchCategory, MatchResult, ReconciliationReport, ReportDocument, SourceRecord, TargetRecord,
    UpdateIntent,
};
pub use phone::NormalizedPhone;
pub use planner::{plan_migrations, plan_updates, MigrationIntent, PlanWarning, UpdatePlan};
pub use status::CanonicalStatus;
