use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;

use crate::commands::sync::{auto_archive, auto_push};
use crate::commands::{CommandReport, parse_date_arg};
use crate::journal::entries::{EntryPatch, EntryStore, entries_on, new_entry};
use crate::journal::model::{EntrySource, JournalEntry, normalize_entry_time};
use crate::journal::session::Session;

#[derive(Debug, Clone)]
pub enum EntryAction {
    Add {
        text: String,
        date: Option<String>,
        time: Option<String>,
    },
    List {
        date: Option<String>,
    },
    Edit {
        id: String,
        text: Option<String>,
        date: Option<String>,
        time: Option<String>,
        clear_time: bool,
    },
    Delete {
        id: String,
    },
}

fn parse_time_arg(raw: &str) -> Result<String> {
    normalize_entry_time(raw).ok_or_else(|| anyhow!("invalid time `{raw}`: expected HH:MM"))
}

fn describe(entry: &JournalEntry) -> String {
    format!(
        "{} {} {}{}",
        entry.id,
        entry.entry_date,
        entry.time_prefix(),
        entry.text
    )
}

pub fn run(action: EntryAction) -> Result<CommandReport> {
    let session = Session::open()?;
    let user = session.user_id().to_string();

    match action {
        EntryAction::Add { text, date, time } => {
            let mut report = CommandReport::new("entry add");
            if text.trim().is_empty() {
                bail!("entry text must not be empty");
            }
            let date = match date {
                Some(raw) => parse_date_arg(&raw)?,
                None => session.today(),
            };
            let time = time.as_deref().map(parse_time_arg).transpose()?;
            let entry = session
                .entries
                .insert(&user, new_entry(&text, date, time, EntrySource::Manual))?;
            auto_push(&session, &entry);
            report.detail(describe(&entry));
            report.data(&entry)?;
            Ok(report)
        }
        EntryAction::List { date } => {
            let mut report = CommandReport::new("entry list");
            let mut entries = session.list_entries()?;
            if let Some(raw) = date {
                entries = entries_on(&entries, parse_date_arg(&raw)?);
            }
            for entry in &entries {
                report.detail(describe(entry));
            }
            report.data(&entries)?;
            Ok(report)
        }
        EntryAction::Edit {
            id,
            text,
            date,
            time,
            clear_time,
        } => {
            let mut report = CommandReport::new("entry edit");
            if text.as_deref().is_some_and(|t| t.trim().is_empty()) {
                bail!("entry text must not be empty");
            }
            let entry_date: Option<NaiveDate> = date.as_deref().map(parse_date_arg).transpose()?;
            let entry_time = if clear_time {
                Some(None)
            } else {
                time.as_deref().map(parse_time_arg).transpose()?.map(Some)
            };
            let patch = EntryPatch {
                text: text.map(|t| t.trim().to_string()),
                entry_date,
                entry_time,
            };
            if patch.is_empty() {
                bail!("nothing to change: pass --text, --date, --time or --clear-time");
            }
            let entry = session.entries.update(&user, &id, &patch)?;
            report.detail(describe(&entry));
            report.data(&entry)?;
            Ok(report)
        }
        EntryAction::Delete { id } => {
            let mut report = CommandReport::new("entry delete");
            match session.entries.delete(&user, &id)? {
                Some(entry) => {
                    auto_archive(&session, &entry);
                    report.detail(format!("deleted {}", entry.id));
                    report.data(&entry)?;
                }
                None => report.issue(format!("entry {id} not found")),
            }
            Ok(report)
        }
    }
}
