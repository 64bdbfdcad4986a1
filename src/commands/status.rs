use anyhow::Result;
use serde::Serialize;

use crate::commands::CommandReport;
use crate::journal::audit::read_events;
use crate::journal::config::unknown_env_keys;
use crate::journal::session::Session;

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    build_id: &'static str,
    home: String,
    config_file: String,
    config_file_present: bool,
    user_id: String,
    model: String,
    transport: Option<&'static str>,
    remote_configured: bool,
    notes_configured: bool,
    entries: usize,
    analyzed_days: usize,
    timezone: String,
    last_audit: Option<String>,
}

pub fn run() -> Result<CommandReport> {
    let session = Session::open()?;
    let mut report = CommandReport::new("status");

    let transport = match session.gateway() {
        Ok(gateway) => Some(gateway.transport_label()),
        Err(err) => {
            report.issue(format!("model gateway unavailable: {err}"));
            None
        }
    };
    let entries = session.list_entries()?;
    let days = session.cache.get(session.user_id())?;

    let snapshot = StatusSnapshot {
        build_id: env!("DAYLENS_BUILD_ID"),
        home: session.paths.home.display().to_string(),
        config_file: session.paths.config_file.display().to_string(),
        config_file_present: session.paths.config_file.exists(),
        user_id: session.user_id().to_string(),
        model: session.config.model.model.clone(),
        transport,
        remote_configured: session.remote.is_some(),
        notes_configured: session.notes_workspace()?.is_some(),
        entries: entries.len(),
        analyzed_days: days.len(),
        timezone: session.timezone().to_string(),
        last_audit: read_events(&session.paths)?
            .last()
            .map(|event| format!("{} {} {}", event.phase, event.status, event.message)),
    };

    report.detail(format!("build_id={}", snapshot.build_id));
    report.detail(format!("home={}", snapshot.home));
    report.detail(format!(
        "config={} present={}",
        snapshot.config_file, snapshot.config_file_present
    ));
    report.detail(format!("user_id={}", snapshot.user_id));
    report.detail(format!(
        "model={} transport={}",
        snapshot.model,
        snapshot.transport.unwrap_or("none")
    ));
    report.detail(format!("remote={}", snapshot.remote_configured));
    report.detail(format!("notes={}", snapshot.notes_configured));
    report.detail(format!(
        "entries={} analyzed_days={}",
        snapshot.entries, snapshot.analyzed_days
    ));
    report.detail(format!("timezone={}", snapshot.timezone));
    if let Some(last) = &snapshot.last_audit {
        report.detail(format!("last_audit={last}"));
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key}"));
    }

    report.data(&snapshot)?;
    Ok(report)
}
