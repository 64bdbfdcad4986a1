use anyhow::{Context, Result};
use serde::Serialize;

use crate::commands::CommandReport;
use crate::error::AnalysisError;
use crate::journal::alerts::{AlertBook, AlertChange};
use crate::journal::audit;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::entries::entries_within;
use crate::journal::guard::InFlightGuard;
use crate::journal::merge::alert_key;
use crate::journal::model::Alert;
use crate::journal::session::Session;
use crate::journal::util::now_epoch_secs;

const GUARD_KIND: &str = "alerts";

#[derive(Debug, Clone)]
pub enum AlertsAction {
    List { all: bool },
    Generate,
    Update,
    Scan,
    Dismiss { key: String },
    Restore { key: String },
}

#[derive(Debug, Serialize)]
struct AlertRow<'a> {
    key: String,
    dismissed: bool,
    #[serde(flatten)]
    alert: &'a Alert,
}

fn describe(alert: &Alert) -> String {
    format!(
        "[{}/{}] {} ({})",
        alert.kind.label(),
        alert.severity.label(),
        alert.text,
        alert.source_dates.join(", ")
    )
}

fn list(session: &Session, book: &AlertBook, all: bool) -> Result<CommandReport> {
    let mut report = CommandReport::new("alerts list");
    let state = book.state();
    let window = entries_within(
        &session.list_entries()?,
        session.today(),
        session.config.analysis.alert_window_days,
    );
    if state.is_stale(&window) {
        report.detail("alerts are stale: run `daylens alerts update`");
    }

    let mut rows = Vec::new();
    for alert in &state.alerts {
        let key = alert_key(alert);
        let dismissed = state.dismissed.contains(&key);
        if dismissed && !all {
            continue;
        }
        let marker = if dismissed { " [dismissed]" } else { "" };
        report.detail(format!("{}{marker}  key={key}", describe(alert)));
        rows.push(AlertRow {
            key,
            dismissed,
            alert,
        });
    }
    if rows.is_empty() {
        report.detail("no alerts");
    }
    report.data(&rows)?;
    Ok(report)
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Generate,
    Update,
    Scan,
}

impl Pass {
    fn name(self) -> &'static str {
        match self {
            Pass::Generate => "generate",
            Pass::Update => "update",
            Pass::Scan => "scan",
        }
    }
}

fn model_pass(session: &Session, book: &mut AlertBook, pass: Pass) -> Result<CommandReport> {
    let mut report = CommandReport::new(format!("alerts {}", pass.name()));

    let window = entries_within(
        &session.list_entries()?,
        session.today(),
        session.config.analysis.alert_window_days,
    );
    if window.is_empty() {
        report.detail(format!(
            "no entries in the last {} days",
            session.config.analysis.alert_window_days
        ));
        return Ok(report);
    }

    let days = session.cache.get(session.user_id())?;
    let gateway = session
        .gateway()
        .context("model gateway is not configured")?;
    let analyzer = CrossDayAnalyzer::new(&gateway, &session.config.model);
    let now = now_epoch_secs()?;
    let outcome: Result<AlertChange, AnalysisError> = match pass {
        Pass::Generate => book.regenerate(&analyzer, &window, &days, now),
        Pass::Update => book.update(&analyzer, &window, &days, now),
        Pass::Scan => book.scan(&analyzer, &window, &days),
    };

    let phase = format!("alerts_{}", pass.name());
    match outcome {
        Ok(change) => {
            audit::record(
                &session.paths,
                &phase,
                "ok",
                &format!("added={} total={}", change.added, change.total),
            );
            report.detail(format!("added={} total={}", change.added, change.total));
            for alert in book.state().active() {
                report.detail(describe(alert));
            }
        }
        Err(err) => {
            audit::record(&session.paths, &phase, "failed", &err.to_string());
            report.issue(format!("alert {} failed [{}]: {err}", pass.name(), err.kind().as_str()));
        }
    }
    session.flush_remote();
    Ok(report)
}

pub fn run(action: AlertsAction) -> Result<CommandReport> {
    let session = Session::open()?;
    // Writers hold the guard across load and commit so none of them saves
    // over a change it never saw.
    let _guard = match action {
        AlertsAction::List { .. } => None,
        _ => Some(InFlightGuard::acquire(&session.paths, GUARD_KIND)?),
    };
    let mut book = AlertBook::load(session.alert_slot())?;

    let report = match action {
        AlertsAction::List { all } => list(&session, &book, all)?,
        AlertsAction::Generate => model_pass(&session, &mut book, Pass::Generate)?,
        AlertsAction::Update => model_pass(&session, &mut book, Pass::Update)?,
        AlertsAction::Scan => model_pass(&session, &mut book, Pass::Scan)?,
        AlertsAction::Dismiss { key } => {
            let mut report = CommandReport::new("alerts dismiss");
            if book.dismiss(&key)? {
                report.detail(format!("dismissed {key}"));
            } else {
                report.issue(format!("no alert with key {key}"));
            }
            session.flush_remote();
            report
        }
        AlertsAction::Restore { key } => {
            let mut report = CommandReport::new("alerts restore");
            if book.restore(&key)? {
                report.detail(format!("restored {key}"));
            } else {
                report.issue(format!("{key} is not dismissed"));
            }
            session.flush_remote();
            report
        }
    };
    Ok(report)
}
