//! Aggregate prompts over many days. Results are returned raw (normalized
//! but unmerged); persistence and dedup belong to the caller.

use crate::error::GatewayError;
use crate::gemini::gateway::{GenerateOptions, ModelClient};
use crate::journal::cache::DayMap;
use crate::journal::config::ModelConfig;
use crate::journal::model::{
    Alert, AlertType, Experiment, GlobalReport, Hypothesis, JournalEntry, MoodTrend, Observation,
    PlaceholderHint, Priority, Recommendation, RoutineSlot, SubstanceAnalysis, Utterance,
    parse_entry_date,
};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::warn;

pub const MAX_HINTS: usize = 6;

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| value.get(*name).filter(|v| !v.is_null()))
}

fn text_field(value: &Value, names: &[&str]) -> Option<String> {
    match field(value, names)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn list_field<'a>(value: &'a Value, names: &[&str]) -> &'a [Value] {
    field(value, names)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Bare strings are accepted wherever an object with a `text` field is.
fn item_text(item: &Value, names: &[&str]) -> Option<String> {
    match item {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => text_field(other, names),
    }
}

fn confidence(item: &Value) -> u8 {
    let Some(value) = field(item, &["confidence"]) else {
        return 50;
    };
    let Some(raw) = value.as_f64() else {
        return 50;
    };
    // `0.7` and `1.0` are fractions; an integer `1` is already a percentage.
    let fraction = raw > 0.0 && (raw < 1.0 || (raw == 1.0 && value.is_f64()));
    let scaled = if fraction { raw * 100.0 } else { raw };
    scaled.round().clamp(0.0, 100.0) as u8
}

pub fn normalize_report(raw: &Value, generated_at_epoch_secs: u64) -> GlobalReport {
    let observations = list_field(raw, &["observations"])
        .iter()
        .filter_map(|item| {
            Some(Observation {
                text: item_text(item, &["text", "observation"])?,
                evidence: text_field(item, &["evidence"]),
            })
        })
        .collect();
    let hypotheses = list_field(raw, &["hypotheses"])
        .iter()
        .filter_map(|item| {
            Some(Hypothesis {
                text: item_text(item, &["text", "hypothesis"])?,
                confidence: confidence(item),
                how_to_test: text_field(item, &["howToTest", "how_to_test", "test"]),
            })
        })
        .collect();
    let substance_analyses = list_field(
        raw,
        &["substanceAnalysis", "substanceAnalyses", "medicationAnalysis", "substances"],
    )
    .iter()
    .filter_map(|item| {
        Some(SubstanceAnalysis {
            name: text_field(item, &["name", "substance"])?,
            observed_effects: text_field(item, &["observedEffects", "effects", "observed_effects"])
                .unwrap_or_default(),
            timing: text_field(item, &["timing"]),
        })
    })
    .collect();
    let recommendations = list_field(raw, &["recommendations"])
        .iter()
        .filter_map(|item| {
            Some(Recommendation {
                text: item_text(item, &["text", "recommendation"])?,
                priority: text_field(item, &["priority"])
                    .map(|p| Priority::from_label(&p))
                    .unwrap_or_default(),
                rationale: text_field(item, &["rationale", "why"]),
            })
        })
        .collect();
    let routine: Vec<RoutineSlot> = list_field(raw, &["idealRoutine", "ideal_routine"])
        .iter()
        .filter_map(|item| {
            Some(RoutineSlot {
                time: text_field(item, &["time"])?,
                activity: text_field(item, &["activity"])?,
                reason: text_field(item, &["reason"]),
            })
        })
        .collect();
    let experiments = list_field(raw, &["experiments"])
        .iter()
        .filter_map(|item| {
            Some(Experiment {
                title: item_text(item, &["title", "name"])?,
                protocol: text_field(item, &["protocol", "description"]).unwrap_or_default(),
                duration_days: field(item, &["durationDays", "duration_days", "duration"])
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok()),
            })
        })
        .collect();

    GlobalReport {
        executive_summary: text_field(raw, &["executiveSummary", "executive_summary", "summary"])
            .unwrap_or_default(),
        mood_trend: text_field(raw, &["moodTrend", "mood_trend"])
            .map(|t| MoodTrend::from_label(&t))
            .unwrap_or_default(),
        observations,
        hypotheses,
        substance_analyses,
        recommendations,
        ideal_routine: (!routine.is_empty()).then_some(routine),
        experiments,
        generated_at_epoch_secs,
    }
}

fn normalize_alert(item: &Value) -> Option<Alert> {
    let text = item_text(item, &["text", "title"])?;
    let kind = text_field(item, &["type"])
        .map(|t| AlertType::from_label(&t))
        .unwrap_or_default();
    let source_dates = list_field(item, &["sourceDates", "source_dates", "dates"])
        .iter()
        .filter_map(Value::as_str)
        .filter_map(parse_entry_date)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    Some(Alert {
        text,
        kind,
        severity: text_field(item, &["severity"])
            .map(|s| Priority::from_label(&s))
            .unwrap_or_default(),
        detail: text_field(item, &["detail"]).unwrap_or_default(),
        source_dates,
        source_excerpt: text_field(item, &["sourceExcerpt", "source_excerpt", "excerpt"])
            .unwrap_or_default(),
        search_query: if kind == AlertType::Answer {
            text_field(item, &["searchQuery", "search_query"])
        } else {
            None
        },
    })
}

/// Accepts `{"alerts": [...]}` or a single alert object.
pub fn normalize_alerts(raw: &Value) -> Vec<Alert> {
    if let Some(items) = field(raw, &["alerts"]).and_then(Value::as_array) {
        return items.iter().filter_map(normalize_alert).collect();
    }
    normalize_alert(raw).into_iter().collect()
}

pub fn normalize_hints(raw: &Value) -> Vec<PlaceholderHint> {
    list_field(raw, &["hints", "prompts"])
        .iter()
        .filter_map(|item| {
            Some(PlaceholderHint {
                text: item_text(item, &["text", "hint"])?,
                source_date: text_field(item, &["sourceDate", "source_date"])
                    .filter(|d| parse_entry_date(d).is_some()),
                source_time: text_field(item, &["sourceTime", "source_time"]),
            })
        })
        .take(MAX_HINTS)
        .collect()
}

pub fn time_of_day_label(now: NaiveTime) -> &'static str {
    match now.hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

fn write_entry_lines(prompt: &mut String, entries: &[JournalEntry]) {
    for entry in entries {
        let _ = writeln!(
            prompt,
            "- {} {}{}",
            entry.entry_date.format("%Y-%m-%d"),
            entry.time_prefix(),
            entry.text.trim()
        );
    }
}

fn write_summaries(prompt: &mut String, entries: &[JournalEntry], days: &DayMap) {
    let dates: BTreeSet<NaiveDate> = entries.iter().map(|e| e.entry_date).collect();
    let mut wrote_header = false;
    for date in dates {
        let Some(day) = days.get(&date) else {
            continue;
        };
        if !wrote_header {
            prompt.push_str("\nDay summaries:\n");
            wrote_header = true;
        }
        let _ = writeln!(prompt, "- {}: {}", date.format("%Y-%m-%d"), day.summary);
    }
}

const ALERT_SHAPE: &str = "Return one JSON object {\"alerts\": [...]} where each alert is \
{\"text\" (one-line headline), \"type\" (warning, medication, pattern, positive or answer), \
\"severity\" (high, medium or low), \"detail\", \"sourceDates\" (YYYY-MM-DD list), \
\"sourceExcerpt\" (short quote from the entries), \"searchQuery\" (only for type answer, \
otherwise null)}. Never include to-do items, reminders or tasks; only observations about \
health, mood, medication and patterns. Use type answer when the writer asked a question \
in an entry. Respond with JSON only.\n";

pub fn build_report_prompt(days: &DayMap) -> String {
    let mut prompt = String::from(
        "You are reviewing every analyzed day of a personal wellness journal to write one \
         overall report.\n\nDays, oldest first:\n",
    );
    for (date, day) in days {
        let _ = write!(prompt, "- {}: {}", date.format("%Y-%m-%d"), day.summary);
        if let Some(insight) = &day.insight {
            let _ = write!(prompt, " | insight: {insight}");
        }
        if !day.actions.is_empty() {
            let actions: Vec<String> = day
                .actions
                .iter()
                .map(|a| match (&a.detail, &a.time) {
                    (Some(detail), Some(time)) => format!("{} {detail} at {time}", a.name),
                    (Some(detail), None) => format!("{} {detail}", a.name),
                    (None, Some(time)) => format!("{} at {time}", a.name),
                    (None, None) => a.name.clone(),
                })
                .collect();
            let _ = write!(prompt, " | actions: {}", actions.join(", "));
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nReturn one JSON object with these fields:\n\
         - \"executiveSummary\": one paragraph.\n\
         - \"moodTrend\": improving, stable, declining or fluctuating.\n\
         - \"observations\": confirmed patterns as {\"text\", \"evidence\"}.\n\
         - \"hypotheses\": {\"text\", \"confidence\" (0-100), \"howToTest\"}.\n\
         - \"substanceAnalysis\": per medication or substance {\"name\", \"observedEffects\", \"timing\"}.\n\
         - \"recommendations\": {\"text\", \"priority\" (high, medium, low), \"rationale\"}.\n\
         - \"idealRoutine\": optional list of {\"time\", \"activity\", \"reason\"}, or null.\n\
         - \"experiments\": {\"title\", \"protocol\", \"durationDays\"}.\n\
         Every list except idealRoutine must contain at least one item. Respond with JSON only.\n",
    );
    prompt
}

pub fn build_alerts_prompt(entries: &[JournalEntry], days: &DayMap) -> String {
    let mut prompt = String::from(
        "You watch a personal wellness journal for things the writer should notice.\n\n\
         Entries from the last two weeks:\n",
    );
    write_entry_lines(&mut prompt, entries);
    write_summaries(&mut prompt, entries, days);
    prompt.push('\n');
    prompt.push_str(ALERT_SHAPE);
    prompt
}

pub fn build_missed_alerts_prompt(
    entries: &[JournalEntry],
    days: &DayMap,
    existing: &[Alert],
) -> String {
    let mut prompt = build_alerts_prompt(entries, days);
    if !existing.is_empty() {
        prompt.push_str(
            "\nThese alerts already exist. Do not repeat them or rephrase them; only report \
             what they missed:\n",
        );
        for alert in existing {
            let _ = writeln!(prompt, "- {}", alert.text);
        }
        prompt.push_str("Return an empty alerts list if nothing was missed.\n");
    }
    prompt
}

pub fn build_hints_prompt(recent: &[JournalEntry], now: NaiveTime) -> String {
    let mut prompt = format!(
        "Suggest up to {MAX_HINTS} short writing prompts for the next journal entry. \
         It is currently {}.\n\nMost recent entries:\n",
        time_of_day_label(now)
    );
    write_entry_lines(&mut prompt, recent);
    prompt.push_str(
        "\nEach prompt is one short question or sentence starter that follows up on \
         something the writer mentioned. Return {\"hints\": [{\"text\", \"sourceDate\" \
         (YYYY-MM-DD of the entry it follows up on, or null), \"sourceTime\" (HH:MM or \
         null)}]}. Respond with JSON only.\n",
    );
    prompt
}

pub fn build_voice_prompt(utterances: &[Utterance]) -> String {
    let mut prompt = String::from(
        "Turn this voice conversation into one journal entry written in the first person \
         by the user.\n\nConversation:\n",
    );
    for utterance in utterances {
        let _ = writeln!(prompt, "{}: {}", utterance.speaker.trim(), utterance.text.trim());
    }
    prompt.push_str(
        "\nRules: write plain prose as the user, keep every fact they mentioned, do not \
         start with a time opener such as \"Today\" or \"This morning\", and do not add \
         advice, interpretation or anything that was not said. Output only the entry text.\n",
    );
    prompt
}

pub struct CrossDayAnalyzer<'a, M: ModelClient + ?Sized> {
    model: &'a M,
    cfg: &'a ModelConfig,
}

impl<'a, M: ModelClient + ?Sized> CrossDayAnalyzer<'a, M> {
    pub fn new(model: &'a M, cfg: &'a ModelConfig) -> Self {
        Self { model, cfg }
    }

    fn call_json(&self, prompt: &str, options: GenerateOptions) -> Result<Value, GatewayError> {
        Ok(self.model.call(prompt, &options)?.into_json())
    }

    pub fn global_report(
        &self,
        days: &DayMap,
        generated_at_epoch_secs: u64,
    ) -> Result<GlobalReport, GatewayError> {
        let prompt = build_report_prompt(days);
        let raw = self.call_json(
            &prompt,
            GenerateOptions::json(self.cfg.report, self.cfg.retries),
        )?;
        Ok(normalize_report(&raw, generated_at_epoch_secs))
    }

    pub fn alerts(&self, entries: &[JournalEntry], days: &DayMap) -> Result<Vec<Alert>, GatewayError> {
        let prompt = build_alerts_prompt(entries, days);
        let raw = self.call_json(
            &prompt,
            GenerateOptions::json(self.cfg.alerts, self.cfg.retries),
        )?;
        Ok(normalize_alerts(&raw))
    }

    pub fn missed_alerts(
        &self,
        entries: &[JournalEntry],
        days: &DayMap,
        existing: &[Alert],
    ) -> Result<Vec<Alert>, GatewayError> {
        let prompt = build_missed_alerts_prompt(entries, days, existing);
        let raw = self.call_json(
            &prompt,
            GenerateOptions::json(self.cfg.alerts, self.cfg.retries),
        )?;
        Ok(normalize_alerts(&raw))
    }

    /// Best effort: any failure is logged and reads as `None`.
    pub fn hints(&self, recent: &[JournalEntry], now: NaiveTime) -> Option<Vec<PlaceholderHint>> {
        let prompt = build_hints_prompt(recent, now);
        match self.call_json(&prompt, GenerateOptions::json(self.cfg.hints, self.cfg.retries)) {
            Ok(raw) => Some(normalize_hints(&raw)),
            Err(err) => {
                warn!(code = err.kind().as_str(), error = %err, "hint generation failed");
                None
            }
        }
    }

    pub fn voice_to_journal(&self, utterances: &[Utterance]) -> Result<String, GatewayError> {
        let prompt = build_voice_prompt(utterances);
        let output = self.model.call(
            &prompt,
            &GenerateOptions::text(self.cfg.voice, self.cfg.retries),
        )?;
        Ok(output.into_text())
    }
}
