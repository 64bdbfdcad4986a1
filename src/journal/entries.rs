use crate::error::StoreError;
use crate::journal::local_store::LocalStore;
use crate::journal::model::{EntrySource, JournalEntry};
use crate::journal::paths::JournalPaths;
use chrono::NaiveDate;
use uuid::Uuid;

const ENTRIES_KEY: &str = "entries";

/// Keyed CRUD collection of journal entries.
pub trait EntryStore {
    fn list(&self, user_id: &str) -> Result<Vec<JournalEntry>, StoreError>;
    fn insert(&self, user_id: &str, entry: JournalEntry) -> Result<JournalEntry, StoreError>;
    fn update(
        &self,
        user_id: &str,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<JournalEntry, StoreError>;
    /// Returns the removed entry, or `None` when the id was unknown.
    fn delete(&self, user_id: &str, id: &str) -> Result<Option<JournalEntry>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub text: Option<String>,
    pub entry_date: Option<NaiveDate>,
    /// `Some(None)` clears the time.
    pub entry_time: Option<Option<String>>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.entry_date.is_none() && self.entry_time.is_none()
    }

    fn apply(&self, entry: &mut JournalEntry) {
        if let Some(text) = &self.text {
            entry.text = text.clone();
        }
        if let Some(date) = self.entry_date {
            entry.entry_date = date;
        }
        if let Some(time) = &self.entry_time {
            entry.entry_time = time.clone();
        }
    }
}

pub fn new_entry(
    text: &str,
    entry_date: NaiveDate,
    entry_time: Option<String>,
    source: EntrySource,
) -> JournalEntry {
    JournalEntry {
        id: Uuid::now_v7().to_string(),
        text: text.trim().to_string(),
        entry_date,
        entry_time,
        source,
    }
}

pub fn sort_entries(entries: &mut [JournalEntry]) {
    entries.sort_by(|a, b| {
        a.entry_date
            .cmp(&b.entry_date)
            .then_with(|| a.entry_time.cmp(&b.entry_time))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn entries_on(entries: &[JournalEntry], date: NaiveDate) -> Vec<JournalEntry> {
    entries
        .iter()
        .filter(|entry| entry.entry_date == date)
        .cloned()
        .collect()
}

/// Entries dated within the `days` days ending at `today` inclusive.
pub fn entries_within(entries: &[JournalEntry], today: NaiveDate, days: i64) -> Vec<JournalEntry> {
    let start = today - chrono::Duration::days(days.max(1) - 1);
    entries
        .iter()
        .filter(|entry| entry.entry_date >= start && entry.entry_date <= today)
        .cloned()
        .collect()
}

/// One JSON file per user under `<home>/entries/`.
#[derive(Debug, Clone)]
pub struct FileEntryStore {
    paths: JournalPaths,
}

fn collaborator(err: StoreError) -> StoreError {
    match err {
        StoreError::Local(message) => StoreError::Collaborator(message),
        other => other,
    }
}

impl FileEntryStore {
    pub fn new(paths: &JournalPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    fn store(&self, user_id: &str) -> LocalStore {
        LocalStore::open(self.paths.entries_file(user_id))
    }
}

impl EntryStore for FileEntryStore {
    fn list(&self, user_id: &str) -> Result<Vec<JournalEntry>, StoreError> {
        let mut entries = self
            .store(user_id)
            .get_as::<Vec<JournalEntry>>(ENTRIES_KEY)
            .map_err(collaborator)?
            .unwrap_or_default();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn insert(&self, user_id: &str, entry: JournalEntry) -> Result<JournalEntry, StoreError> {
        let mut entries = self.list(user_id)?;
        if entries.iter().any(|existing| existing.id == entry.id) {
            return Err(StoreError::Collaborator(format!(
                "entry {} already exists",
                entry.id
            )));
        }
        entries.push(entry.clone());
        sort_entries(&mut entries);
        self.store(user_id)
            .set(ENTRIES_KEY, &entries)
            .map_err(collaborator)?;
        Ok(entry)
    }

    fn update(
        &self,
        user_id: &str,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<JournalEntry, StoreError> {
        let mut entries = self.list(user_id)?;
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
            return Err(StoreError::Collaborator(format!("entry {id} not found")));
        };
        patch.apply(entry);
        let updated = entry.clone();
        sort_entries(&mut entries);
        self.store(user_id)
            .set(ENTRIES_KEY, &entries)
            .map_err(collaborator)?;
        Ok(updated)
    }

    fn delete(&self, user_id: &str, id: &str) -> Result<Option<JournalEntry>, StoreError> {
        let mut entries = self.list(user_id)?;
        let Some(position) = entries.iter().position(|entry| entry.id == id) else {
            return Ok(None);
        };
        let removed = entries.remove(position);
        self.store(user_id)
            .set(ENTRIES_KEY, &entries)
            .map_err(collaborator)?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).expect("date")
    }

    #[test]
    fn crud_cycle_keeps_entries_sorted() {
        let tmp = tempdir().expect("tempdir");
        let paths = JournalPaths::under(tmp.path().to_path_buf());
        let store = FileEntryStore::new(&paths);

        let late = store
            .insert(
                "u1",
                new_entry("evening walk", day(2), Some("19:00".into()), EntrySource::Manual),
            )
            .expect("insert");
        let early = store
            .insert(
                "u1",
                new_entry("coffee", day(2), Some("08:00".into()), EntrySource::Manual),
            )
            .expect("insert");
        store
            .insert("u1", new_entry("first day", day(1), None, EntrySource::Voice))
            .expect("insert");

        let listed = store.list("u1").expect("list");
        let texts: Vec<&str> = listed.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first day", "coffee", "evening walk"]);

        let patch = EntryPatch {
            text: Some("espresso".into()),
            entry_time: Some(None),
            ..EntryPatch::default()
        };
        let updated = store.update("u1", &early.id, &patch).expect("update");
        assert_eq!(updated.text, "espresso");
        assert_eq!(updated.entry_time, None);

        let removed = store.delete("u1", &late.id).expect("delete");
        assert_eq!(removed.map(|e| e.id), Some(late.id));
        assert_eq!(store.delete("u1", "missing").expect("delete"), None);
        assert_eq!(store.list("u1").expect("list").len(), 2);
        assert!(store.list("someone-else").expect("list").is_empty());
    }

    #[test]
    fn updating_unknown_entry_is_a_collaborator_error() {
        let tmp = tempdir().expect("tempdir");
        let store = FileEntryStore::new(&JournalPaths::under(tmp.path().to_path_buf()));
        let err = store
            .update("u1", "nope", &EntryPatch::default())
            .expect_err("missing");
        assert!(matches!(err, StoreError::Collaborator(_)));
    }

    #[test]
    fn window_includes_today_and_excludes_older_days() {
        let entries = vec![
            new_entry("old", day(1), None, EntrySource::Manual),
            new_entry("edge", day(2), None, EntrySource::Manual),
            new_entry("today", day(15), None, EntrySource::Manual),
        ];
        let window = entries_within(&entries, day(15), 14);
        let texts: Vec<&str> = window.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["edge", "today"]);
    }
}
