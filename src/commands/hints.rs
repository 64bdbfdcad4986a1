use anyhow::{Context, Result};

use crate::commands::CommandReport;
use crate::journal::audit;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::hints::{HintBook, HintRefresh};
use crate::journal::model::PlaceholderHint;
use crate::journal::session::Session;
use crate::journal::util::now_epoch_secs;

fn describe(hint: &PlaceholderHint) -> String {
    match (&hint.source_date, &hint.source_time) {
        (Some(date), Some(time)) => format!("{} (from {date} {time})", hint.text),
        (Some(date), None) => format!("{} (from {date})", hint.text),
        _ => hint.text.clone(),
    }
}

pub fn run(force: bool) -> Result<CommandReport> {
    let session = Session::open()?;
    let mut report = CommandReport::new("hints");
    let mut book = HintBook::load(session.hints_slot())?;

    let entries = session.list_entries()?;
    let keep = session.config.analysis.hint_entries;
    let recent = &entries[entries.len().saturating_sub(keep)..];

    let gateway = session
        .gateway()
        .context("model gateway is not configured")?;
    let analyzer = CrossDayAnalyzer::new(&gateway, &session.config.model);
    let refresh = book.refresh(
        &analyzer,
        recent,
        session.now_local().time(),
        now_epoch_secs()?,
        session.config.analysis.hint_stale_secs,
        force,
    )?;

    let hints = match refresh {
        HintRefresh::Cached(hints) => {
            audit::record(&session.paths, "hints", "cached", "");
            hints
        }
        HintRefresh::Fresh(hints) => {
            audit::record(&session.paths, "hints", "ok", &format!("hints={}", hints.len()));
            hints
        }
        HintRefresh::Failed => {
            audit::record(&session.paths, "hints", "failed", "");
            report.detail("hint generation failed; showing previous hints");
            book.state().hints.clone()
        }
    };
    for hint in &hints {
        report.detail(describe(hint));
    }
    report.data(&hints)?;
    Ok(report)
}
