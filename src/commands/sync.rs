use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::warn;

use crate::commands::CommandReport;
use crate::journal::entries::EntryStore;
use crate::journal::model::JournalEntry;
use crate::journal::notes::{NotesSync, NotionWorkspace};
use crate::journal::schedule::{IntervalScheduler, SystemClock, ThreadSleeper};
use crate::journal::session::Session;

#[derive(Debug, Clone, Copy)]
pub enum SyncDirection {
    Push,
    Pull,
}

fn scheduler(session: &Session) -> IntervalScheduler {
    IntervalScheduler::new(Duration::from_millis(session.config.notes.min_interval_ms))
}

type NotionSync<'a> = NotesSync<'a, NotionWorkspace, SystemClock, ThreadSleeper>;

fn syncer<'a>(session: &Session, workspace: &'a NotionWorkspace, db: &str) -> NotionSync<'a> {
    NotesSync::new(workspace, db, scheduler(session))
}

pub fn run(direction: SyncDirection) -> Result<CommandReport> {
    let session = Session::open()?;
    let Some((workspace, db)) = session.notes_workspace()? else {
        bail!("notes sync needs notes.database_id and NOTION_TOKEN");
    };
    let mut sync = syncer(&session, &workspace, &db);

    match direction {
        SyncDirection::Push => {
            let mut report = CommandReport::new("sync push");
            let entries = session.list_entries()?;
            let mut mirrored = session.mirrored_pages()?;
            let outcome = sync.push(&entries, &mut mirrored);
            // Pages created before a failure are still recorded.
            session.save_mirrored_pages(&mirrored)?;
            let pushed = outcome.context("notes push failed")?;
            report.detail(format!("pushed={pushed} mirrored={}", mirrored.len()));
            Ok(report)
        }
        SyncDirection::Pull => {
            let mut report = CommandReport::new("sync pull");
            let existing = session.list_entries()?;
            let pulled = sync.pull(&existing).context("notes pull failed")?;
            for entry in &pulled.imported {
                session.entries.insert(session.user_id(), entry.clone())?;
            }
            report.detail(format!(
                "imported={} skipped={} pages_seen={}",
                pulled.imported.len(),
                pulled.skipped,
                pulled.pages_seen
            ));
            report.data(&pulled.imported)?;
            Ok(report)
        }
    }
}

/// Best-effort mirror after `entry add`. Failures are logged, never raised.
pub fn auto_push(session: &Session, entry: &JournalEntry) {
    if !session.config.notes.auto_sync {
        return;
    }
    let result = (|| -> Result<()> {
        let Some((workspace, db)) = session.notes_workspace()? else {
            return Ok(());
        };
        let mut mirrored = session.mirrored_pages()?;
        syncer(session, &workspace, &db).push(std::slice::from_ref(entry), &mut mirrored)?;
        session.save_mirrored_pages(&mirrored)?;
        Ok(())
    })();
    if let Err(err) = result {
        warn!(entry = %entry.id, error = %format!("{err:#}"), "notes auto-push failed");
    }
}

/// Best-effort archive after `entry delete`.
pub fn auto_archive(session: &Session, entry: &JournalEntry) {
    if !session.config.notes.auto_sync {
        return;
    }
    let result = (|| -> Result<()> {
        let Some((workspace, db)) = session.notes_workspace()? else {
            return Ok(());
        };
        let mut mirrored = session.mirrored_pages()?;
        if syncer(session, &workspace, &db).archive(entry, &mut mirrored)? {
            session.save_mirrored_pages(&mirrored)?;
        }
        Ok(())
    })();
    if let Err(err) = result {
        warn!(entry = %entry.id, error = %format!("{err:#}"), "notes auto-archive failed");
    }
}
