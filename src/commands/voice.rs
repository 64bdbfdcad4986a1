use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::commands::sync::auto_push;
use crate::journal::audit;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::entries::{EntryStore, new_entry};
use crate::journal::model::{EntrySource, Utterance};
use crate::journal::session::Session;

fn read_transcript(path: &Path) -> Result<Vec<Utterance>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let utterances: Vec<Utterance> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of {{speaker, text}}", path.display()))?;
    Ok(utterances
        .into_iter()
        .filter(|u| !u.text.trim().is_empty())
        .collect())
}

/// Turns a recorded conversation into one first-person journal entry.
pub fn run(transcript: &Path) -> Result<CommandReport> {
    let session = Session::open()?;
    let mut report = CommandReport::new("voice");
    let utterances = read_transcript(transcript)?;
    if utterances.is_empty() {
        bail!("transcript {} has no utterances", transcript.display());
    }

    let gateway = session
        .gateway()
        .context("model gateway is not configured")?;
    let analyzer = CrossDayAnalyzer::new(&gateway, &session.config.model);
    let text = match analyzer.voice_to_journal(&utterances) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            audit::record(&session.paths, "voice", "failed", "empty journal text");
            report.issue("model returned no journal text");
            return Ok(report);
        }
        Err(err) => {
            audit::record(&session.paths, "voice", "failed", &err.to_string());
            report.issue(format!("voice conversion failed [{}]: {err}", err.kind().as_str()));
            return Ok(report);
        }
    };

    let now = session.now_local();
    let entry = session.entries.insert(
        session.user_id(),
        new_entry(
            &text,
            now.date(),
            Some(now.format("%H:%M").to_string()),
            EntrySource::Voice,
        ),
    )?;
    audit::record(
        &session.paths,
        "voice",
        "ok",
        &format!("utterances={}", utterances.len()),
    );
    auto_push(&session, &entry);
    report.detail(format!("{} {}", entry.id, entry.text));
    report.data(&entry)?;
    Ok(report)
}
