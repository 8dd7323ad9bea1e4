use std::collections::HashMap;

use crate::model::{MatchCategory, MatchResult, ReconSummary};

/// Compute summary counts for a reconciliation run.
pub fn compute_summary(
    source_count: usize,
    target_count: usize,
    matches: &[MatchResult],
    unmatched_target_count: usize,
) -> ReconSummary {
    let matched_count = matches.iter().filter(|m| m.is_matched()).count();
    let status_diff_count = matches.iter().filter(|m| m.status_differs).count();

    ReconSummary {
        source_count,
        target_count,
        matched_count,
        unmatched_source_count: matches.len() - matched_count,
        unmatched_target_count,
        status_diff_count,
    }
}

/// Matched pairs per category, most frequent first (ties by category order).
pub fn match_type_breakdown(matches: &[MatchResult]) -> Vec<(MatchCategory, usize)> {
    let mut counts: HashMap<MatchCategory, usize> = HashMap::new();
    for m in matches.iter().filter(|m| m.is_matched()) {
        *counts.entry(m.match_type).or_insert(0) += 1;
    }
    let mut out: Vec<(MatchCategory, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    out
}
