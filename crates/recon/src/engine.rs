use std::collections::{BTreeMap, HashSet};

use crate::matcher::find_match;
use crate::model::{
    DuplicatePhone, LeadRef, MatchCategory, MatchResult, ReconciliationReport, SourceRecord,
    TargetRecord,
};
use crate::phone::NormalizedPhone;
use crate::summary::compute_summary;

const PROGRESS_EVERY: usize = 50;

/// Reconcile a source snapshot against a target snapshot.
///
/// Sources are processed once each, in input order. A target can be claimed
/// by at most one source per run (first come, first served), so the result
/// depends only on the two inputs and their order.
pub fn reconcile(sources: &[SourceRecord], targets: &[TargetRecord]) -> ReconciliationReport {
    let mut claimed: HashSet<String> = HashSet::with_capacity(targets.len());
    let mut matches: Vec<MatchResult> = Vec::with_capacity(sources.len());

    for (i, source) in sources.iter().enumerate() {
        let outcome = find_match(source, targets, &claimed);

        let result = match outcome.target {
            Some(target) => {
                claimed.insert(target.id.clone());
                MatchResult {
                    source: source.clone(),
                    target: Some(target.clone()),
                    match_type: outcome.category,
                    match_confidence: outcome.confidence,
                    status_differs: source.status != target.status,
                }
            }
            None => MatchResult {
                source: source.clone(),
                target: None,
                match_type: MatchCategory::None,
                match_confidence: 0.0,
                status_differs: false,
            },
        };
        matches.push(result);

        if (i + 1) % PROGRESS_EVERY == 0 {
            log::info!("processed {}/{} source leads", i + 1, sources.len());
        }
    }

    let unmatched_target: Vec<LeadRef> = targets
        .iter()
        .filter(|t| !claimed.contains(&t.id))
        .map(LeadRef::from)
        .collect();

    let unmatched_source: Vec<LeadRef> = matches
        .iter()
        .filter(|m| !m.is_matched())
        .map(|m| LeadRef::from(&m.source))
        .collect();

    let duplicate_target_phones = duplicate_phones(targets);
    for dup in &duplicate_target_phones {
        log::warn!(
            "phone {} is shared by {} target leads ({}); the first in load order wins",
            dup.phone,
            dup.target_ids.len(),
            dup.target_ids.join(", "),
        );
    }

    let summary = compute_summary(sources.len(), targets.len(), &matches, unmatched_target.len());

    ReconciliationReport {
        summary,
        matches,
        unmatched_source,
        unmatched_target,
        duplicate_target_phones,
    }
}

/// Normalized phones carried by more than one target, ids in load order.
pub fn duplicate_phones(targets: &[TargetRecord]) -> Vec<DuplicatePhone> {
    let mut by_phone: BTreeMap<NormalizedPhone, Vec<String>> = BTreeMap::new();
    for t in targets {
        if let Some(p) = t.normalized_phone() {
            by_phone.entry(p).or_default().push(t.id.clone());
        }
    }
    by_phone
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(phone, target_ids)| DuplicatePhone { phone, target_ids })
        .collect()
}
