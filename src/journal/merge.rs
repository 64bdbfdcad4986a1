//! Incremental alert merging. Alert identity is derived from content, so
//! independent generations of the same observation collapse to one record.

use crate::journal::model::Alert;
use std::collections::BTreeSet;

pub const ALERT_KEY_PREFIX_CHARS: usize = 50;

/// Lowercased, whitespace-collapsed text prefix plus the first source date.
pub fn alert_key(alert: &Alert) -> String {
    let normalized = alert
        .text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let prefix: String = normalized.chars().take(ALERT_KEY_PREFIX_CHARS).collect();
    let first_date = alert.source_dates.first().map(String::as_str).unwrap_or("");
    format!("{prefix}|{first_date}")
}

/// `existing` followed by the members of `incoming` whose key is not
/// already present in `existing`. Order within both is preserved.
pub fn merge_alerts(existing: &[Alert], incoming: Vec<Alert>) -> Vec<Alert> {
    let known: BTreeSet<String> = existing.iter().map(alert_key).collect();
    let mut merged = existing.to_vec();
    merged.extend(
        incoming
            .into_iter()
            .filter(|alert| !known.contains(&alert_key(alert))),
    );
    merged
}

/// Drops dismissals whose alert no longer exists.
pub fn prune_dismissed(dismissed: &BTreeSet<String>, alerts: &[Alert]) -> BTreeSet<String> {
    let live: BTreeSet<String> = alerts.iter().map(alert_key).collect();
    dismissed.intersection(&live).cloned().collect()
}
