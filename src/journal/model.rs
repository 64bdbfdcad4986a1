use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    #[default]
    Manual,
    Voice,
    Imported,
}

impl EntrySource {
    pub fn label(self) -> &'static str {
        match self {
            EntrySource::Manual => "manual",
            EntrySource::Voice => "voice",
            EntrySource::Imported => "imported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub text: String,
    pub entry_date: NaiveDate,
    pub entry_time: Option<String>,
    #[serde(default)]
    pub source: EntrySource,
}

impl JournalEntry {
    /// `HH:MM ` prefix used when an entry is quoted inside a prompt.
    pub fn time_prefix(&self) -> String {
        match self.entry_time.as_deref() {
            Some(time) if !time.trim().is_empty() => format!("[{}] ", time.trim()),
            _ => String::new(),
        }
    }
}

pub fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Accepts `H:MM`/`HH:MM` and returns the zero-padded `HH:MM` form.
pub fn normalize_entry_time(raw: &str) -> Option<String> {
    let parsed = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()?;
    Some(parsed.format("%H:%M").to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Medication,
    Supplement,
    Caffeine,
    Substance,
    Exercise,
    Wellness,
    Social,
    Therapy,
    #[default]
    #[serde(other)]
    Other,
}

impl ActionType {
    pub fn label(self) -> &'static str {
        match self {
            ActionType::Medication => "medication",
            ActionType::Supplement => "supplement",
            ActionType::Caffeine => "caffeine",
            ActionType::Substance => "substance",
            ActionType::Exercise => "exercise",
            ActionType::Wellness => "wellness",
            ActionType::Social => "social",
            ActionType::Therapy => "therapy",
            ActionType::Other => "other",
        }
    }

    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "medication" | "medicine" | "med" => ActionType::Medication,
            "supplement" => ActionType::Supplement,
            "caffeine" => ActionType::Caffeine,
            "substance" | "alcohol" | "drug" => ActionType::Substance,
            "exercise" | "sport" => ActionType::Exercise,
            "wellness" => ActionType::Wellness,
            "social" => ActionType::Social,
            "therapy" => ActionType::Therapy,
            _ => ActionType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub detail: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: ActionType,
}

impl Action {
    /// Identity used by the override map: case-insensitive name plus type.
    pub fn key(&self) -> String {
        format!("{}|{}", self.name.trim().to_lowercase(), self.kind.label())
    }
}

/// One per `entry_date`. A record with an empty `summary` means the
/// analysis is unavailable, never "analyzed and found nothing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DayAnalysis {
    pub summary: String,
    pub insight: Option<String>,
    pub actions: Vec<Action>,
    pub entries_hash: Option<String>,
}

impl DayAnalysis {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MoodTrend {
    Improving,
    Stable,
    Declining,
    Fluctuating,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MoodTrend {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "improving" | "up" | "better" => MoodTrend::Improving,
            "stable" | "steady" => MoodTrend::Stable,
            "declining" | "down" | "worse" => MoodTrend::Declining,
            "fluctuating" | "mixed" | "volatile" => MoodTrend::Fluctuating,
            _ => MoodTrend::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MoodTrend::Improving => "improving",
            MoodTrend::Stable => "stable",
            MoodTrend::Declining => "declining",
            MoodTrend::Fluctuating => "fluctuating",
            MoodTrend::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "urgent" => Priority::High,
            "low" | "minor" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub text: String,
    /// Clamped to 0..=100.
    pub confidence: u8,
    pub how_to_test: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceAnalysis {
    pub name: String,
    pub observed_effects: String,
    pub timing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub text: String,
    pub priority: Priority,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineSlot {
    pub time: String,
    pub activity: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub title: String,
    pub protocol: String,
    pub duration_days: Option<u32>,
}

/// Replaced wholesale on each regeneration; never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GlobalReport {
    pub executive_summary: String,
    pub mood_trend: MoodTrend,
    pub observations: Vec<Observation>,
    pub hypotheses: Vec<Hypothesis>,
    pub substance_analyses: Vec<SubstanceAnalysis>,
    pub recommendations: Vec<Recommendation>,
    pub ideal_routine: Option<Vec<RoutineSlot>>,
    pub experiments: Vec<Experiment>,
    pub generated_at_epoch_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    Medication,
    #[default]
    Pattern,
    Positive,
    Answer,
}

impl AlertType {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "warning" => AlertType::Warning,
            "medication" => AlertType::Medication,
            "positive" => AlertType::Positive,
            "answer" => AlertType::Answer,
            _ => AlertType::Pattern,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertType::Warning => "warning",
            AlertType::Medication => "medication",
            AlertType::Pattern => "pattern",
            AlertType::Positive => "positive",
            AlertType::Answer => "answer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: Priority,
    pub detail: String,
    pub source_dates: Vec<String>,
    pub source_excerpt: String,
    /// Only meaningful for `AlertType::Answer`.
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderHint {
    pub text: String,
    pub source_date: Option<String>,
    pub source_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
}
