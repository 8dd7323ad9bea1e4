//! Canonical lead-status vocabulary and the CRM label mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of lifecycle states the lead store recognizes.
///
/// Flat set: no transition graph is enforced. The CRM is authoritative for
/// the current value and overwrites whatever the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    // Follow-up
    NotContacted,
    NoAnswer,
    // Warm
    Contacted,
    MessageSent,
    // Hot
    MeetingSet,
    PendingAgreement,
    // Signed
    Signed,
    UnderReview,
    ReportSubmitted,
    MissingDocument,
    Completed,
    // Lost
    NotRelevant,
    ClosedElsewhere,
    // Future
    FutureInterest,
}

impl CanonicalStatus {
    pub const ALL: [CanonicalStatus; 14] = [
        Self::NotContacted,
        Self::NoAnswer,
        Self::Contacted,
        Self::MessageSent,
        Self::MeetingSet,
        Self::PendingAgreement,
        Self::Signed,
        Self::UnderReview,
        Self::ReportSubmitted,
        Self::MissingDocument,
        Self::Completed,
        Self::NotRelevant,
        Self::ClosedElsewhere,
        Self::FutureInterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotContacted => "not_contacted",
            Self::NoAnswer => "no_answer",
            Self::Contacted => "contacted",
            Self::MessageSent => "message_sent",
            Self::MeetingSet => "meeting_set",
            Self::PendingAgreement => "pending_agreement",
            Self::Signed => "signed",
            Self::UnderReview => "under_review",
            Self::ReportSubmitted => "report_submitted",
            Self::MissingDocument => "missing_document",
            Self::Completed => "completed",
            Self::NotRelevant => "not_relevant",
            Self::ClosedElsewhere => "closed_elsewhere",
            Self::FutureInterest => "future_interest",
        }
    }

    /// Vocabulary lookup. `None` means the key is outside the fixed set.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| format!("unknown canonical status '{s}'"))
    }
}

/// Key produced for a blank CRM label. Not in the vocabulary, so such leads
/// never push a status update.
pub const BLANK_LABEL_STATUS: &str = "new";

/// CRM (Hebrew) label → canonical key. Includes the underscore spellings the
/// CRM emits in URL-encoded exports.
const LABEL_MAP: &[(&str, CanonicalStatus)] = &[
    ("חתם על הסכם התקשרות", CanonicalStatus::Signed),
    ("נקבעה שיחה", CanonicalStatus::MeetingSet),
    ("אין מענה", CanonicalStatus::NoAnswer),
    ("לא רלוונטי", CanonicalStatus::NotRelevant),
    ("נשלחה הודעה", CanonicalStatus::MessageSent),
    ("טרם יצרנו קשר", CanonicalStatus::NotContacted),
    ("סגר במקום אחר", CanonicalStatus::ClosedElsewhere),
    ("מעוניין בעתיד", CanonicalStatus::FutureInterest),
    ("בהמתנה להסכם", CanonicalStatus::PendingAgreement),
    ("נוצר קשר", CanonicalStatus::Contacted),
    ("לפני תיקשרות", CanonicalStatus::NotContacted),
    ("לפני_תיקשרות", CanonicalStatus::NotContacted),
    ("רלוונטי לשנה הבאה", CanonicalStatus::FutureInterest),
    ("רלוונטי_לשנה_הבאה", CanonicalStatus::FutureInterest),
    ("נשלח הסכם התקשרות", CanonicalStatus::PendingAgreement),
    ("נשלח_הסכם_התקשרות", CanonicalStatus::PendingAgreement),
    ("סגר עם גורם אחר", CanonicalStatus::ClosedElsewhere),
    ("סגר_עם_גורם_אחר", CanonicalStatus::ClosedElsewhere),
];

/// Deprecated CRM labels folded into their replacement status
/// (new → not_contacted, customer → signed, lost → not_relevant).
const LEGACY_LABEL_MAP: &[(&str, CanonicalStatus)] = &[
    ("חדש", CanonicalStatus::NotContacted),
    ("לקוח", CanonicalStatus::Signed),
    ("אבוד", CanonicalStatus::NotRelevant),
];

/// Deprecated store keys and their replacements, used by status migration.
const LEGACY_KEY_MAP: &[(&str, CanonicalStatus)] = &[
    ("new", CanonicalStatus::NotContacted),
    ("customer", CanonicalStatus::Signed),
    ("lost", CanonicalStatus::NotRelevant),
];

/// Map a raw CRM status label to a canonical key. Total: unknown labels fall
/// back to a slug (lowercase, spaces → `_`) that may lie outside the
/// vocabulary; the planner suppresses those.
pub fn canonical_status(raw_label: &str) -> String {
    let label = raw_label.trim();
    if label.is_empty() {
        return BLANK_LABEL_STATUS.to_string();
    }
    LABEL_MAP
        .iter()
        .chain(LEGACY_LABEL_MAP)
        .find(|(l, _)| *l == label)
        .map(|(_, s)| s.as_str().to_string())
        .unwrap_or_else(|| slugify(label))
}

fn slugify(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}

/// Replacement for a deprecated store key, if it is one.
pub fn legacy_replacement(key: &str) -> Option<CanonicalStatus> {
    LEGACY_KEY_MAP
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, s)| *s)
}

/// True when `key` is a member of the canonical vocabulary.
pub fn is_canonical(key: &str) -> bool {
    CanonicalStatus::from_key(key).is_some()
}
