use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::phone::{self, NormalizedPhone};
use crate::status::{self, CanonicalStatus};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A lead as the CRM holds it.
///
/// Deserialization always derives `status` from `status_raw`; a `status`
/// field in the input is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSourceRecord")]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Canonical key derived from `status_raw` (may lie outside the vocabulary).
    pub status: String,
    pub status_raw: String,
    pub created_at: String,
    /// Free-text notes / call log.
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
struct RawSourceRecord {
    id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    status_raw: String,
    created_at: String,
    #[serde(default)]
    notes: Option<String>,
}

impl From<RawSourceRecord> for SourceRecord {
    fn from(raw: RawSourceRecord) -> Self {
        Self {
            email: raw.email,
            phone: raw.phone,
            notes: raw.notes,
            ..Self::new(raw.id, raw.name, raw.status_raw, raw.created_at)
        }
    }
}

impl SourceRecord {
    /// Build a record, deriving `status` from the raw CRM label.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status_raw: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        let status_raw = status_raw.into();
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            status: status::canonical_status(&status_raw),
            status_raw,
            created_at: created_at.into(),
            notes: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn normalized_phone(&self) -> Option<NormalizedPhone> {
        phone::normalize(self.phone.as_deref())
    }

    /// Notes with surrounding whitespace removed; `None` when blank.
    pub fn trimmed_notes(&self) -> Option<&str> {
        self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// A lead as the local store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub status: String,
    pub created_at: String,
    /// Open attribute bag (linking ids, synced notes, …).
    #[serde(default)]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

impl TargetRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            status: status.into(),
            created_at: created_at.into(),
            custom_fields: serde_json::Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn normalized_phone(&self) -> Option<NormalizedPhone> {
        phone::normalize(self.phone.as_deref())
    }
}

/// Reject target batches that break the unique-id guarantee.
pub fn check_unique_target_ids(targets: &[TargetRecord]) -> Result<(), ReconError> {
    let mut seen = std::collections::HashSet::with_capacity(targets.len());
    for t in targets {
        if !seen.insert(t.id.as_str()) {
            return Err(ReconError::InvalidSnapshot(format!(
                "duplicate target id '{}'",
                t.id
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Tier at which a source record was linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    Phone,
    Email,
    Name,
    None,
}

impl MatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Name => "name",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source record and the target it was linked to, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source: SourceRecord,
    pub target: Option<TargetRecord>,
    pub match_type: MatchCategory,
    pub match_confidence: f64,
    pub status_differs: bool,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.target.is_some()
    }
}

/// Identity + status projection used for the unmatched lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRef {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: String,
}

impl From<&SourceRecord> for LeadRef {
    fn from(r: &SourceRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            phone: r.phone.clone(),
            email: r.email.clone(),
            status: r.status.clone(),
        }
    }
}

impl From<&TargetRecord> for LeadRef {
    fn from(r: &TargetRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            phone: r.phone.clone(),
            email: r.email.clone(),
            status: r.status.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconSummary {
    pub source_count: usize,
    pub target_count: usize,
    pub matched_count: usize,
    pub unmatched_source_count: usize,
    pub unmatched_target_count: usize,
    pub status_diff_count: usize,
}

impl ReconSummary {
    /// Matched share of source records, in percent.
    pub fn match_rate(&self) -> Option<f64> {
        (self.source_count > 0)
            .then(|| self.matched_count as f64 / self.source_count as f64 * 100.0)
    }
}

/// A normalized phone carried by more than one target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatePhone {
    pub phone: NormalizedPhone,
    pub target_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub summary: ReconSummary,
    pub matches: Vec<MatchResult>,
    pub unmatched_source: Vec<LeadRef>,
    pub unmatched_target: Vec<LeadRef>,
    #[serde(default)]
    pub duplicate_target_phones: Vec<DuplicatePhone>,
}

/// On-disk form of a report: the report plus the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

impl ReportDocument {
    pub fn new(report: ReconciliationReport, generated_at: DateTime<Utc>) -> Self {
        Self { generated_at, report }
    }

    pub fn to_json(&self) -> Result<String, ReconError> {
        serde_json::to_string_pretty(self).map_err(|e| ReconError::Encode(e.to_string()))
    }

    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        serde_json::from_str(input).map_err(|e| ReconError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// One planned mutation against a target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateIntent {
    pub target_id: String,
    pub lead_name: String,
    pub old_status: String,
    /// Set only when the status actually changes.
    pub new_status: Option<CanonicalStatus>,
    pub notes: Option<String>,
    /// Source identifier recorded on the target as the link.
    pub source_id: String,
    pub match_type: MatchCategory,
    pub match_confidence: f64,
}

impl UpdateIntent {
    pub fn changes_status(&self) -> bool {
        self.new_status.is_some()
    }

    /// Status the target ends up with after this intent.
    pub fn resulting_status(&self) -> &str {
        self.new_status
            .as_ref()
            .map(CanonicalStatus::as_str)
            .unwrap_or(&self.old_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_status_is_derived_from_label() {
        let records: Vec<SourceRecord> = serde_json::from_str(
            r#"[
                {"id":"z-1","name":"A","status":"","status_raw":"נקבעה שיחה","created_at":"2026-01-12T10:00:00+02:00"},
                {"id":"z-2","name":"B","status":"signed","status_raw":"אין מענה","created_at":"2026-01-12T10:00:00+02:00"},
                {"id":"z-3","name":"C","status_raw":"Follow Up","created_at":"2026-01-12T10:00:00+02:00"},
                {"id":"z-4","name":"D","created_at":"2026-01-12T10:00:00+02:00"}
            ]"#,
        )
        .unwrap();
        let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();
        assert_eq!(statuses, ["meeting_set", "no_answer", "follow_up", "new"]);
    }

    #[test]
    fn source_record_round_trips() {
        let record = SourceRecord::new("z-1", "Dana", "חתם על הסכם התקשרות", "2026-01-12T10:00:00+02:00")
            .with_phone("0501234567")
            .with_notes("call back");
        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.status, "signed");
    }
}
