use crate::error::StoreError;
use crate::gemini::gateway::{GenerateOptions, ModelClient};
use crate::journal::cache::{AnalysisCache, DayMap};
use crate::journal::config::GenerationProfile;
use crate::journal::hasher::entries_fingerprint;
use crate::journal::legacy::normalize_day_analysis;
use crate::journal::model::{DayAnalysis, JournalEntry};
use chrono::NaiveDate;
use std::fmt::Write as _;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorDay {
    pub date: NaiveDate,
    pub summary: String,
    pub insight: Option<String>,
}

/// Up to `limit` analyzed days strictly before `date`, oldest first.
pub fn prior_days_context(days: &DayMap, date: NaiveDate, limit: usize) -> Vec<PriorDay> {
    let mut prior: Vec<PriorDay> = days
        .range(..date)
        .rev()
        .take(limit)
        .map(|(date, day)| PriorDay {
            date: *date,
            summary: day.summary.clone(),
            insight: day.insight.clone(),
        })
        .collect();
    prior.reverse();
    prior
}

pub fn build_day_prompt(
    date: NaiveDate,
    entries: &[JournalEntry],
    prior: &[PriorDay],
    profile: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You analyze one day of a personal wellness journal and extract structured facts.\n\n",
    );

    if let Some(profile) = profile.map(str::trim).filter(|p| !p.is_empty()) {
        let _ = writeln!(prompt, "About the writer:\n{profile}\n");
    }

    if !prior.is_empty() {
        prompt.push_str("Previous days, oldest first:\n");
        for day in prior {
            let _ = write!(prompt, "- {}: {}", day.date.format("%Y-%m-%d"), day.summary);
            if let Some(insight) = &day.insight {
                let _ = write!(prompt, " (insight: {insight})");
            }
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "Entries for {}:", date.format("%Y-%m-%d"));
    for entry in entries {
        let _ = writeln!(prompt, "{}{}", entry.time_prefix(), entry.text.trim());
    }

    prompt.push_str(
        "\nReturn one JSON object with exactly these fields:\n\
         - \"summary\": two or three sentences describing the day. Never empty.\n\
         - \"insight\": one concrete observation connecting today to the writer's patterns \
         or previous days. Never empty and never a statement that no pattern was found; \
         there is always something to observe.\n\
         - \"actions\": every medication, supplement, caffeine, substance, exercise, wellness, \
         social or therapy action mentioned, as objects \
         {\"name\", \"detail\", \"time\" (HH:MM or null), \"type\"} where type is one of \
         medication, supplement, caffeine, substance, exercise, wellness, social, therapy, other. \
         Use an empty list when nothing was mentioned.\n\
         Use only what the entries say. Respond with JSON only.\n",
    );
    prompt
}

#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    /// Stored hash matched; no model call was made.
    Cached(DayAnalysis),
    Fresh(DayAnalysis),
    /// Model or repair failure. Nothing was persisted.
    Unavailable { reason: String },
}

impl DayOutcome {
    pub fn analysis(&self) -> DayAnalysis {
        match self {
            DayOutcome::Cached(day) | DayOutcome::Fresh(day) => day.clone(),
            DayOutcome::Unavailable { .. } => DayAnalysis::unavailable(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            DayOutcome::Cached(_) => "cached",
            DayOutcome::Fresh(_) => "ok",
            DayOutcome::Unavailable { .. } => "failed",
        }
    }
}

pub struct DayAnalyzer<'a, M: ModelClient + ?Sized> {
    model: &'a M,
    cache: &'a AnalysisCache,
    options: GenerateOptions,
}

impl<'a, M: ModelClient + ?Sized> DayAnalyzer<'a, M> {
    pub fn new(
        model: &'a M,
        cache: &'a AnalysisCache,
        profile: GenerationProfile,
        retries: u32,
    ) -> Self {
        Self {
            model,
            cache,
            options: GenerateOptions::json(profile, retries),
        }
    }

    /// Model failures come back as `Unavailable`; only a failed local write
    /// is an error.
    pub fn analyze(
        &self,
        user_id: &str,
        date: NaiveDate,
        entries: &[JournalEntry],
        cached: Option<&DayAnalysis>,
        prior: &[PriorDay],
        profile: Option<&str>,
    ) -> Result<DayOutcome, StoreError> {
        if entries.is_empty() {
            return Ok(DayOutcome::Unavailable {
                reason: format!("no entries for {date}"),
            });
        }

        let hash = entries_fingerprint(entries);
        if let Some(cached) = cached
            && cached.is_available()
            && cached.entries_hash.as_deref() == Some(hash.as_str())
        {
            return Ok(DayOutcome::Cached(cached.clone()));
        }

        let prompt = build_day_prompt(date, entries, prior, profile);
        let raw = match self.model.call(&prompt, &self.options) {
            Ok(output) => output.into_json(),
            Err(err) => {
                warn!(%date, code = err.kind().as_str(), error = %err, "day analysis failed");
                return Ok(DayOutcome::Unavailable {
                    reason: err.to_string(),
                });
            }
        };

        let mut analysis = normalize_day_analysis(&raw);
        if !analysis.is_available() {
            warn!(%date, "model reply had no summary; treating analysis as unavailable");
            return Ok(DayOutcome::Unavailable {
                reason: "model reply had no summary".to_string(),
            });
        }
        analysis.entries_hash = Some(hash);

        self.cache.put(user_id, date, &analysis)?;
        info!(%date, actions = analysis.actions.len(), "day analysis stored");
        Ok(DayOutcome::Fresh(analysis))
    }
}
