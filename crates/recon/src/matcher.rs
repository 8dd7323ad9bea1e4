//! Tiered source → target linking: exact phone, then exact email, then
//! fuzzy name. The first tier that produces a candidate wins; tiers are
//! never combined.

use std::collections::HashSet;

use crate::model::{MatchCategory, SourceRecord, TargetRecord};
use crate::similarity;

pub const PHONE_CONFIDENCE: f64 = 1.0;
pub const EMAIL_CONFIDENCE: f64 = 0.9;
/// Minimum name ratio for a candidate to qualify.
pub const NAME_THRESHOLD: f64 = 0.85;
/// Name confidence = ratio × this, keeping the tier below phone/email.
pub const NAME_DISCOUNT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome<'t> {
    pub target: Option<&'t TargetRecord>,
    pub category: MatchCategory,
    pub confidence: f64,
}

impl<'t> MatchOutcome<'t> {
    fn none() -> Self {
        Self {
            target: None,
            category: MatchCategory::None,
            confidence: 0.0,
        }
    }

    fn hit(target: &'t TargetRecord, category: MatchCategory, confidence: f64) -> Self {
        Self {
            target: Some(target),
            category,
            confidence,
        }
    }
}

/// Find the target for `source`, skipping every id in `claimed`.
///
/// Phone and email tiers take the first qualifying target in `targets`
/// order; the name tier takes the highest ratio, ties going to the earlier
/// target.
pub fn find_match<'t>(
    source: &SourceRecord,
    targets: &'t [TargetRecord],
    claimed: &HashSet<String>,
) -> MatchOutcome<'t> {
    let open = move || targets.iter().filter(move |t| !claimed.contains(&t.id));

    if let Some(phone) = source.normalized_phone() {
        if let Some(t) = open().find(|t| t.normalized_phone().as_ref() == Some(&phone)) {
            return MatchOutcome::hit(t, MatchCategory::Phone, PHONE_CONFIDENCE);
        }
    }

    if let Some(email) = source.email.as_deref().and_then(normalize_email) {
        let same = |t: &&TargetRecord| {
            t.email.as_deref().and_then(normalize_email).as_deref() == Some(email.as_str())
        };
        if let Some(t) = open().find(same) {
            return MatchOutcome::hit(t, MatchCategory::Email, EMAIL_CONFIDENCE);
        }
    }

    let mut best: Option<(&TargetRecord, f64)> = None;
    for t in open() {
        let Some(score) = name_score(&source.name, &t.name) else {
            continue;
        };
        if score < NAME_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((t, score));
        }
    }

    match best {
        Some((t, score)) => MatchOutcome::hit(t, MatchCategory::Name, score * NAME_DISCOUNT),
        None => MatchOutcome::none(),
    }
}

/// Lowercased, trimmed email; `None` when blank.
pub fn normalize_email(email: &str) -> Option<String> {
    let e = email.trim().to_lowercase();
    (!e.is_empty()).then_some(e)
}

/// Similarity ratio of two display names, `None` when either is blank.
pub fn name_score(a: &str, b: &str) -> Option<f64> {
    let a = similarity::normalize_name(a);
    let b = similarity::normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(similarity::ratio(&a, &b))
}
