use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::commands::{CommandReport, parse_date_arg};
use crate::journal::audit;
use crate::journal::day::{DayAnalyzer, DayOutcome, prior_days_context};
use crate::journal::entries::entries_on;
use crate::journal::guard::InFlightGuard;
use crate::journal::hasher::entries_fingerprint;
use crate::journal::model::{Action, JournalEntry};
use crate::journal::overrides::{ActionOverrides, effective_actions};
use crate::journal::session::Session;

const GUARD_KIND: &str = "day-analysis";

#[derive(Debug, Clone)]
pub enum AnalyzeTarget {
    Date(String),
    /// Every date whose entries no longer match the stored hash.
    Stale,
}

#[derive(Debug, Serialize)]
struct DayResult {
    date: NaiveDate,
    status: &'static str,
    summary: String,
    insight: Option<String>,
    actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

struct StaleScan {
    dates: Vec<NaiveDate>,
    /// Cached days whose entries were all deleted or moved away.
    orphans: Vec<NaiveDate>,
}

fn stale_dates(entries: &[JournalEntry], session: &Session) -> Result<StaleScan> {
    let days = session.cache.get(session.user_id())?;
    let dates: BTreeSet<NaiveDate> = entries.iter().map(|entry| entry.entry_date).collect();
    let orphans = days
        .keys()
        .filter(|date| !dates.contains(date))
        .copied()
        .collect();
    let dates = dates
        .into_iter()
        .filter(|date| {
            let hash = entries_fingerprint(&entries_on(entries, *date));
            days.get(date)
                .and_then(|day| day.entries_hash.as_deref())
                != Some(hash.as_str())
        })
        .collect();
    Ok(StaleScan { dates, orphans })
}

fn drop_orphans(session: &Session, orphans: &[NaiveDate], report: &mut CommandReport) -> Result<()> {
    for date in orphans {
        if session.cache.remove_day(session.user_id(), *date)? {
            audit::record(&session.paths, "day_analysis", "removed", &format!("date={date} entries=0"));
            report.detail(format!("{date} [removed] no entries left"));
        }
    }
    Ok(())
}

pub fn run(target: AnalyzeTarget) -> Result<CommandReport> {
    let session = Session::open()?;
    let mut report = CommandReport::new("analyze");
    let _guard = InFlightGuard::acquire(&session.paths, GUARD_KIND)?;

    let entries = session.list_entries()?;
    let dates = match target {
        AnalyzeTarget::Date(raw) => vec![parse_date_arg(&raw)?],
        AnalyzeTarget::Stale => {
            let scan = stale_dates(&entries, &session)?;
            drop_orphans(&session, &scan.orphans, &mut report)?;
            scan.dates
        }
    };
    if dates.is_empty() {
        session.flush_remote();
        report.detail("nothing to analyze");
        report.data(&Vec::<DayResult>::new())?;
        return Ok(report);
    }

    let gateway = session
        .gateway()
        .context("model gateway is not configured")?;
    let model_cfg = &session.config.model;
    let analyzer = DayAnalyzer::new(
        &gateway,
        &session.cache,
        model_cfg.day,
        model_cfg.retries,
    );
    let overrides = ActionOverrides::load(session.overrides_slot())?;
    let profile = session.profile_context();
    let user = session.user_id();

    let mut days = session.cache.get(user)?;
    let mut results = Vec::new();
    for date in dates {
        let day_entries = entries_on(&entries, date);
        let prior = prior_days_context(&days, date, session.config.analysis.prior_days);
        let outcome = analyzer.analyze(
            user,
            date,
            &day_entries,
            days.get(&date),
            &prior,
            profile.as_deref(),
        )?;

        let reason = match &outcome {
            DayOutcome::Unavailable { reason } => {
                report.issue(format!("{date}: analysis unavailable ({reason})"));
                Some(reason.clone())
            }
            DayOutcome::Fresh(day) => {
                days.insert(date, day.clone());
                None
            }
            DayOutcome::Cached(_) => None,
        };
        audit::record(
            &session.paths,
            "day_analysis",
            outcome.status(),
            &format!("date={date} entries={}", day_entries.len()),
        );

        let day = outcome.analysis();
        let actions = effective_actions(&day.actions, overrides.for_date(date));
        report.detail(format!("{date} [{}] {}", outcome.status(), day.summary));
        if let Some(insight) = &day.insight {
            report.detail(format!("  insight: {insight}"));
        }
        for action in &actions {
            report.detail(format!("  - {}", describe_action(action)));
        }
        results.push(DayResult {
            date,
            status: outcome.status(),
            summary: day.summary,
            insight: day.insight,
            actions,
            reason,
        });
    }

    session.flush_remote();
    report.data(&results)?;
    Ok(report)
}

pub fn describe_action(action: &Action) -> String {
    let mut line = format!("{} ({})", action.name, action.kind.label());
    if let Some(detail) = &action.detail {
        line.push_str(&format!(" {detail}"));
    }
    if let Some(time) = &action.time {
        line.push_str(&format!(" at {time}"));
    }
    line
}

#[derive(Debug, Serialize)]
struct HashSnapshot {
    date: NaiveDate,
    entries: usize,
    hash: String,
    stored_hash: Option<String>,
    fresh: bool,
}

/// Shows the fingerprint of a date's entries next to the one stored with its
/// analysis.
pub fn run_hash(date: &str) -> Result<CommandReport> {
    let session = Session::open()?;
    let mut report = CommandReport::new("hash");
    let date = parse_date_arg(date)?;
    let day_entries = entries_on(&session.list_entries()?, date);
    if day_entries.is_empty() {
        bail!("no entries for {date}");
    }
    let stored_hash = session
        .cache
        .get_day(session.user_id(), date)?
        .and_then(|day| day.entries_hash);
    let hash = entries_fingerprint(&day_entries);
    let snapshot = HashSnapshot {
        date,
        entries: day_entries.len(),
        fresh: stored_hash.as_deref() == Some(hash.as_str()),
        hash,
        stored_hash,
    };
    report.detail(format!("{date} entries={} hash={}", snapshot.entries, snapshot.hash));
    report.detail(format!(
        "stored={} fresh={}",
        snapshot.stored_hash.as_deref().unwrap_or("none"),
        snapshot.fresh
    ));
    report.data(&snapshot)?;
    Ok(report)
}
