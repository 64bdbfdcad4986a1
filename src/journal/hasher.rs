//! Order-independent fingerprints over entry sets.
//!
//! An entry contributes `id:<first 50 chars of text>`; contributions are
//! sorted and joined with the ASCII unit separator before hashing, so any
//! traversal order of the same set yields the same fingerprint.

use crate::journal::model::JournalEntry;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

pub const TEXT_PREFIX_CHARS: usize = 50;
const DELIMITER: char = '\u{1f}';

fn text_prefix(text: &str) -> String {
    text.chars().take(TEXT_PREFIX_CHARS).collect()
}

fn digest_sorted(mut parts: Vec<String>) -> String {
    parts.sort();
    let mut joined = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            joined.push(DELIMITER);
        }
        joined.push_str(part);
    }
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the exact entry set last analyzed for a date.
pub fn entries_fingerprint<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a JournalEntry>,
{
    let parts = entries
        .into_iter()
        .map(|entry| format!("{}:{}", entry.id, text_prefix(&entry.text)))
        .collect();
    digest_sorted(parts)
}

/// Membership-only fingerprint, used for recent-window staleness checks.
pub fn ids_fingerprint<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
    digest_sorted(parts)
}

/// Identity of a piece of journal text independent of where it is stored,
/// so entries imported from the notes workspace dedupe against native ones.
pub fn text_fingerprint(entry_date: NaiveDate, text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    digest_sorted(vec![format!(
        "{}:{}",
        entry_date.format("%Y-%m-%d"),
        text_prefix(&normalized)
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::model::EntrySource;

    fn entry(id: &str, text: &str) -> JournalEntry {
        JournalEntry {
            id: id.to_string(),
            text: text.to_string(),
            entry_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            entry_time: None,
            source: EntrySource::Manual,
        }
    }

    #[test]
    fn fingerprint_is_stable_under_reordering() {
        let a = entry("1", "slept badly");
        let b = entry("2", "long walk");
        let c = entry("3", "coffee at 10");
        let forward = entries_fingerprint([&a, &b, &c]);
        let backward = entries_fingerprint([&c, &b, &a]);
        let shuffled = entries_fingerprint([&b, &a, &c]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn fingerprint_changes_on_text_or_membership_change() {
        let a = entry("1", "slept badly");
        let b = entry("2", "long walk");
        let base = entries_fingerprint([&a, &b]);

        let edited = entry("2", "short walk");
        assert_ne!(base, entries_fingerprint([&a, &edited]));
        assert_ne!(base, entries_fingerprint([&a]));
        let extra = entry("3", "nap");
        assert_ne!(base, entries_fingerprint([&a, &b, &extra]));
    }

    #[test]
    fn edits_past_the_prefix_do_not_change_the_fingerprint() {
        let stem = "x".repeat(TEXT_PREFIX_CHARS);
        let a = entry("1", &format!("{stem} first tail"));
        let b = entry("1", &format!("{stem} second tail"));
        assert_eq!(entries_fingerprint([&a]), entries_fingerprint([&b]));
    }

    #[test]
    fn ids_fingerprint_ignores_order() {
        assert_eq!(ids_fingerprint(["b", "a"]), ids_fingerprint(["a", "b"]));
        assert_ne!(ids_fingerprint(["a"]), ids_fingerprint(["a", "b"]));
    }

    #[test]
    fn text_fingerprint_collapses_whitespace_and_includes_date() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
        let next = NaiveDate::from_ymd_opt(2026, 1, 2).expect("date");
        assert_eq!(
            text_fingerprint(day, "felt  great\n today"),
            text_fingerprint(day, "felt great today")
        );
        assert_ne!(
            text_fingerprint(day, "felt great"),
            text_fingerprint(next, "felt great")
        );
    }
}
