use crate::error::StoreError;
use crate::journal::entries::new_entry;
use crate::journal::hasher::text_fingerprint;
use crate::journal::model::{EntrySource, JournalEntry, normalize_entry_time, parse_entry_date};
use crate::journal::schedule::{Clock, IntervalScheduler, Sleeper};
use crate::journal::util::truncate_with_ellipsis;
use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info};

pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;
const RICH_TEXT_CHUNK_CHARS: usize = 2000;
const NOTES_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePage {
    pub id: String,
    pub text: String,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesBatch {
    pub pages: Vec<NotePage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Remote paginated page store.
pub trait NotesWorkspace {
    fn query(&self, database_id: &str, cursor: Option<&str>) -> Result<NotesBatch, StoreError>;
    fn create_page(&self, database_id: &str, entry: &JournalEntry) -> Result<String, StoreError>;
    fn archive_page(&self, page_id: &str) -> Result<(), StoreError>;
}

fn collab(action: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Collaborator(format!("notes {action}: {err}"))
}

fn chunk_rich_text(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(RICH_TEXT_CHUNK_CHARS)
        .map(|chunk| json!({ "text": { "content": chunk.iter().collect::<String>() } }))
        .collect()
}

fn plain_text(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub fn page_properties(database_id: &str, entry: &JournalEntry) -> Value {
    let mut properties = json!({
        "Entry": { "title": chunk_rich_text(&entry.text) },
        "Date": { "date": { "start": entry.entry_date.format("%Y-%m-%d").to_string() } },
        "Source": { "select": { "name": entry.source.label() } },
    });
    if let Some(time) = &entry.entry_time {
        properties["Time"] = json!({ "rich_text": chunk_rich_text(time) });
    }
    json!({
        "parent": { "database_id": database_id },
        "properties": properties,
    })
}

pub fn parse_page(page: &Value) -> Option<NotePage> {
    let id = page.get("id")?.as_str()?.to_string();
    let props = page.get("properties")?;
    let text = plain_text(props.get("Entry").and_then(|p| p.get("title")));
    let date = props
        .get("Date")
        .and_then(|p| p.get("date"))
        .and_then(|d| d.get("start"))
        .and_then(Value::as_str)
        .and_then(|start| parse_entry_date(start.get(..10).unwrap_or(start)));
    let time = normalize_entry_time(&plain_text(
        props.get("Time").and_then(|p| p.get("rich_text")),
    ));
    Some(NotePage {
        id,
        text,
        date,
        time,
    })
}

pub struct NotionWorkspace {
    client: Client,
    base_url: String,
    token: String,
}

impl NotionWorkspace {
    pub fn new(base_url: &str, token: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(NOTES_TIMEOUT_SECS))
            .build()
            .map_err(|err| collab("client", err))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn send(&self, request: RequestBuilder, action: &str) -> Result<Value, StoreError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .map_err(|err| collab(action, err.without_url()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| collab(action, err.without_url()))?;
        if !status.is_success() {
            return Err(collab(
                action,
                format!(
                    "status {status}: {}",
                    truncate_with_ellipsis(&body, 200)
                ),
            ));
        }
        serde_json::from_str(&body).map_err(|err| collab(action, err))
    }
}

impl NotesWorkspace for NotionWorkspace {
    fn query(&self, database_id: &str, cursor: Option<&str>) -> Result<NotesBatch, StoreError> {
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        let url = format!("{}/v1/databases/{database_id}/query", self.base_url);
        let reply = self.send(self.client.post(url).json(&body), "query")?;
        let pages = reply
            .get("results")
            .and_then(Value::as_array)
            .map(|results| results.iter().filter_map(parse_page).collect())
            .unwrap_or_default();
        Ok(NotesBatch {
            pages,
            has_more: reply.get("has_more").and_then(Value::as_bool).unwrap_or(false),
            next_cursor: reply
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn create_page(&self, database_id: &str, entry: &JournalEntry) -> Result<String, StoreError> {
        let url = format!("{}/v1/pages", self.base_url);
        let reply = self.send(
            self.client
                .post(url)
                .json(&page_properties(database_id, entry)),
            "create page",
        )?;
        reply
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| collab("create page", "reply had no page id"))
    }

    fn archive_page(&self, page_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/v1/pages/{page_id}", self.base_url);
        self.send(
            self.client.patch(url).json(&json!({ "archived": true })),
            "archive page",
        )?;
        Ok(())
    }
}

/// Fingerprint -> page id for every entry already mirrored to the workspace.
pub type MirroredPages = BTreeMap<String, String>;

pub fn entry_fingerprint(entry: &JournalEntry) -> String {
    text_fingerprint(entry.entry_date, &entry.text)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub imported: Vec<JournalEntry>,
    pub skipped: usize,
    pub pages_seen: usize,
}

/// Sequential, spaced calls against a rate-limited workspace.
pub struct NotesSync<'a, W: NotesWorkspace + ?Sized, C: Clock, S: Sleeper> {
    workspace: &'a W,
    database_id: String,
    scheduler: IntervalScheduler<C, S>,
}

impl<'a, W: NotesWorkspace + ?Sized, C: Clock, S: Sleeper> NotesSync<'a, W, C, S> {
    pub fn new(workspace: &'a W, database_id: &str, scheduler: IntervalScheduler<C, S>) -> Self {
        Self {
            workspace,
            database_id: database_id.to_string(),
            scheduler,
        }
    }

    /// Reads every page and returns entries for pages whose
    /// `(date, text prefix)` fingerprint is not already known locally.
    /// The caller inserts them.
    pub fn pull(&mut self, existing: &[JournalEntry]) -> Result<PullReport, StoreError> {
        let mut known: BTreeSet<String> = existing.iter().map(entry_fingerprint).collect();
        let mut report = PullReport::default();
        let mut cursor: Option<String> = None;

        loop {
            self.scheduler.wait_turn();
            let batch = self
                .workspace
                .query(&self.database_id, cursor.as_deref())?;
            report.pages_seen += batch.pages.len();

            for page in batch.pages {
                let text = page.text.trim();
                let Some(date) = page.date else {
                    report.skipped += 1;
                    continue;
                };
                if text.is_empty() || !known.insert(text_fingerprint(date, text)) {
                    report.skipped += 1;
                    continue;
                }
                report.imported.push(new_entry(
                    text,
                    date,
                    page.time,
                    EntrySource::Imported,
                ));
            }

            match (batch.has_more, batch.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        info!(
            imported = report.imported.len(),
            skipped = report.skipped,
            "notes pull finished"
        );
        Ok(report)
    }

    /// Creates pages for entries not yet mirrored. `mirrored` is updated in
    /// place after each successful create so a mid-way failure keeps what
    /// was already pushed.
    pub fn push(
        &mut self,
        entries: &[JournalEntry],
        mirrored: &mut MirroredPages,
    ) -> Result<usize, StoreError> {
        let mut pushed = 0;
        for entry in entries {
            let fingerprint = entry_fingerprint(entry);
            if mirrored.contains_key(&fingerprint) {
                continue;
            }
            self.scheduler.wait_turn();
            let page_id = self.workspace.create_page(&self.database_id, entry)?;
            debug!(entry = %entry.id, page = %page_id, "entry pushed to notes");
            mirrored.insert(fingerprint, page_id);
            pushed += 1;
        }
        Ok(pushed)
    }

    pub fn archive(
        &mut self,
        entry: &JournalEntry,
        mirrored: &mut MirroredPages,
    ) -> Result<bool, StoreError> {
        let fingerprint = entry_fingerprint(entry);
        let Some(page_id) = mirrored.get(&fingerprint).cloned() else {
            return Ok(false);
        };
        self.scheduler.wait_turn();
        self.workspace.archive_page(&page_id)?;
        mirrored.remove(&fingerprint);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::schedule::testing::{ManualClock, RecordingSleeper};
    use std::cell::RefCell;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).expect("date")
    }

    #[derive(Default)]
    struct FakeWorkspace {
        batches: Vec<NotesBatch>,
        queries: RefCell<Vec<Option<String>>>,
        created: RefCell<Vec<String>>,
        archived: RefCell<Vec<String>>,
        fail_create_after: Option<usize>,
    }

    impl NotesWorkspace for FakeWorkspace {
        fn query(&self, _db: &str, cursor: Option<&str>) -> Result<NotesBatch, StoreError> {
            let index = self.queries.borrow().len();
            self.queries.borrow_mut().push(cursor.map(str::to_string));
            Ok(self.batches.get(index).cloned().unwrap_or_default())
        }

        fn create_page(&self, _db: &str, entry: &JournalEntry) -> Result<String, StoreError> {
            let count = self.created.borrow().len();
            if self.fail_create_after.is_some_and(|limit| count >= limit) {
                return Err(StoreError::Collaborator("rate limited".into()));
            }
            self.created.borrow_mut().push(entry.text.clone());
            Ok(format!("page-{count}"))
        }

        fn archive_page(&self, page_id: &str) -> Result<(), StoreError> {
            self.archived.borrow_mut().push(page_id.to_string());
            Ok(())
        }
    }

    fn page(id: &str, text: &str, d: u32) -> NotePage {
        NotePage {
            id: id.into(),
            text: text.into(),
            date: Some(day(d)),
            time: None,
        }
    }

    fn syncer<'a>(
        workspace: &'a FakeWorkspace,
        sleeper: &RecordingSleeper,
        clock: &ManualClock,
    ) -> NotesSync<'a, FakeWorkspace, ManualClock, RecordingSleeper> {
        NotesSync::new(
            workspace,
            "db",
            IntervalScheduler::with_parts(
                Duration::from_millis(350),
                clock.clone(),
                sleeper.clone(),
            ),
        )
    }

    #[test]
    fn pull_paginates_with_spacing_and_dedupes_by_fingerprint() {
        let workspace = FakeWorkspace {
            batches: vec![
                NotesBatch {
                    pages: vec![page("p1", "Morning  run", 1), page("p2", "New note", 1)],
                    has_more: true,
                    next_cursor: Some("c2".into()),
                },
                NotesBatch {
                    pages: vec![
                        page("p3", "Another", 2),
                        NotePage {
                            date: None,
                            ..page("p4", "undated", 2)
                        },
                    ],
                    has_more: false,
                    next_cursor: None,
                },
            ],
            ..FakeWorkspace::default()
        };
        let clock = ManualClock::new();
        let sleeper = RecordingSleeper::driving(clock.clone());
        let existing = vec![new_entry("Morning run", day(1), None, EntrySource::Manual)];

        let report = syncer(&workspace, &sleeper, &clock)
            .pull(&existing)
            .expect("pull");

        let texts: Vec<&str> = report.imported.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["New note", "Another"]);
        assert!(report.imported.iter().all(|e| e.source == EntrySource::Imported));
        assert_eq!(report.skipped, 2);
        assert_eq!(report.pages_seen, 4);
        assert_eq!(
            *workspace.queries.borrow(),
            vec![None, Some("c2".to_string())]
        );
        assert_eq!(sleeper.recorded(), vec![Duration::from_millis(350)]);
    }

    #[test]
    fn push_skips_mirrored_entries_and_keeps_progress_on_failure() {
        let workspace = FakeWorkspace {
            fail_create_after: Some(1),
            ..FakeWorkspace::default()
        };
        let clock = ManualClock::new();
        let sleeper = RecordingSleeper::driving(clock.clone());
        let already = new_entry("already there", day(1), None, EntrySource::Manual);
        let first = new_entry("first", day(1), None, EntrySource::Manual);
        let second = new_entry("second", day(2), None, EntrySource::Manual);
        let mut mirrored = MirroredPages::new();
        mirrored.insert(entry_fingerprint(&already), "page-old".into());

        let err = syncer(&workspace, &sleeper, &clock)
            .push(&[already, first.clone(), second], &mut mirrored)
            .expect_err("second create fails");
        assert!(matches!(err, StoreError::Collaborator(_)));
        assert_eq!(*workspace.created.borrow(), vec!["first".to_string()]);
        assert_eq!(
            mirrored.get(&entry_fingerprint(&first)).map(String::as_str),
            Some("page-0")
        );
        assert_eq!(mirrored.len(), 2);
    }

    #[test]
    fn archive_removes_the_mirrored_page() {
        let workspace = FakeWorkspace::default();
        let clock = ManualClock::new();
        let sleeper = RecordingSleeper::driving(clock.clone());
        let entry = new_entry("gone", day(1), None, EntrySource::Manual);
        let mut mirrored = MirroredPages::new();
        mirrored.insert(entry_fingerprint(&entry), "page-9".into());

        let mut sync = syncer(&workspace, &sleeper, &clock);
        assert!(sync.archive(&entry, &mut mirrored).expect("archive"));
        assert!(!sync.archive(&entry, &mut mirrored).expect("second archive"));
        assert_eq!(*workspace.archived.borrow(), vec!["page-9".to_string()]);
    }

    #[test]
    fn page_payload_and_parsing_agree() {
        let mut entry = new_entry("Slept well", day(3), Some("07:15".into()), EntrySource::Voice);
        entry.text = "Slept well".into();
        let payload = page_properties("db-1", &entry);
        assert_eq!(payload["parent"]["database_id"], "db-1");
        assert_eq!(payload["properties"]["Source"]["select"]["name"], "voice");
        assert_eq!(payload["properties"]["Date"]["date"]["start"], "2026-01-03");

        let page = json!({
            "id": "abc",
            "properties": {
                "Entry": {"title": [{"plain_text": "Slept "}, {"plain_text": "well"}]},
                "Date": {"date": {"start": "2026-01-03T07:15:00.000+00:00"}},
                "Time": {"rich_text": [{"plain_text": "7:15"}]}
            }
        });
        let parsed = parse_page(&page).expect("page");
        assert_eq!(parsed.text, "Slept well");
        assert_eq!(parsed.date, Some(day(3)));
        assert_eq!(parsed.time.as_deref(), Some("07:15"));
    }

    #[test]
    fn long_text_is_split_into_rich_text_chunks() {
        let text = "a".repeat(RICH_TEXT_CHUNK_CHARS + 5);
        let chunks = chunk_rich_text(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1]["text"]["content"], "aaaaa");
    }
}
