use crate::error::StoreError;
use crate::gemini::gateway::ModelClient;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::model::{JournalEntry, PlaceholderHint};
use crate::journal::state::StateSlot;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HintState {
    pub hints: Vec<PlaceholderHint>,
    pub generated_at_epoch_secs: u64,
}

impl HintState {
    pub fn is_stale(&self, now_epoch_secs: u64, window_secs: u64) -> bool {
        self.hints.is_empty()
            || now_epoch_secs.saturating_sub(self.generated_at_epoch_secs) >= window_secs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HintRefresh {
    Cached(Vec<PlaceholderHint>),
    Fresh(Vec<PlaceholderHint>),
    /// Generation failed; whatever was cached before is kept.
    Failed,
}

pub struct HintBook {
    slot: StateSlot<HintState>,
    state: HintState,
}

impl HintBook {
    pub fn load(slot: StateSlot<HintState>) -> Result<Self, StoreError> {
        let state = slot.load()?.unwrap_or_default();
        Ok(Self { slot, state })
    }

    pub fn state(&self) -> &HintState {
        &self.state
    }

    pub fn refresh<M: ModelClient + ?Sized>(
        &mut self,
        analyzer: &CrossDayAnalyzer<'_, M>,
        recent: &[JournalEntry],
        now: NaiveTime,
        now_epoch_secs: u64,
        window_secs: u64,
        force: bool,
    ) -> Result<HintRefresh, StoreError> {
        if !force && !self.state.is_stale(now_epoch_secs, window_secs) {
            return Ok(HintRefresh::Cached(self.state.hints.clone()));
        }
        let Some(hints) = analyzer.hints(recent, now) else {
            return Ok(HintRefresh::Failed);
        };
        let next = HintState {
            hints: hints.clone(),
            generated_at_epoch_secs: now_epoch_secs,
        };
        self.slot.save(&next)?;
        self.state = next;
        Ok(HintRefresh::Fresh(hints))
    }
}
