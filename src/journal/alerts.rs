use crate::error::{AnalysisError, StoreError};
use crate::gemini::gateway::ModelClient;
use crate::journal::cache::DayMap;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::hasher::ids_fingerprint;
use crate::journal::merge::{alert_key, merge_alerts, prune_dismissed};
use crate::journal::model::{Alert, JournalEntry};
use crate::journal::state::StateSlot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertState {
    pub alerts: Vec<Alert>,
    /// Derived keys. An overlay on `alerts`, never a deletion.
    pub dismissed: BTreeSet<String>,
    pub processed_entry_ids: BTreeSet<String>,
    pub entries_hash: Option<String>,
    pub generated_at_epoch_secs: Option<u64>,
}

impl AlertState {
    pub fn active(&self) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|alert| !self.dismissed.contains(&alert_key(alert)))
            .collect()
    }

    /// True when the window's membership differs from the one last used.
    pub fn is_stale(&self, window: &[JournalEntry]) -> bool {
        let current = ids_fingerprint(window.iter().map(|entry| entry.id.as_str()));
        self.entries_hash.as_deref() != Some(current.as_str())
    }

    pub fn unprocessed(&self, window: &[JournalEntry]) -> Vec<JournalEntry> {
        window
            .iter()
            .filter(|entry| !self.processed_entry_ids.contains(&entry.id))
            .cloned()
            .collect()
    }
}

fn window_ids(window: &[JournalEntry]) -> BTreeSet<String> {
    window.iter().map(|entry| entry.id.clone()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertChange {
    pub added: usize,
    pub total: usize,
}

/// Owns the persisted alert state for one user. Every model-backed change
/// builds the next state, saves it, and only then replaces the in-memory
/// copy, so a failure at any step leaves the processed set untouched.
pub struct AlertBook {
    slot: StateSlot<AlertState>,
    state: AlertState,
}

impl AlertBook {
    pub fn load(slot: StateSlot<AlertState>) -> Result<Self, StoreError> {
        let state = slot.load()?.unwrap_or_default();
        Ok(Self { slot, state })
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    fn commit(&mut self, next: AlertState) -> Result<(), StoreError> {
        self.slot.save(&next)?;
        self.state = next;
        Ok(())
    }

    /// Full regeneration over the window. Replaces every alert and prunes
    /// dismissals that no longer match one.
    pub fn regenerate<M: ModelClient + ?Sized>(
        &mut self,
        analyzer: &CrossDayAnalyzer<'_, M>,
        window: &[JournalEntry],
        days: &DayMap,
        now_epoch_secs: u64,
    ) -> Result<AlertChange, AnalysisError> {
        let alerts = analyzer.alerts(window, days)?;
        let next = AlertState {
            dismissed: prune_dismissed(&self.state.dismissed, &alerts),
            processed_entry_ids: window_ids(window),
            entries_hash: Some(ids_fingerprint(window.iter().map(|e| e.id.as_str()))),
            generated_at_epoch_secs: Some(now_epoch_secs),
            alerts,
        };
        let added = next.alerts.len();
        self.commit(next)?;
        info!(alerts = added, "alerts regenerated");
        Ok(AlertChange {
            added,
            total: added,
        })
    }

    /// Incremental pass over window entries not yet processed.
    pub fn update<M: ModelClient + ?Sized>(
        &mut self,
        analyzer: &CrossDayAnalyzer<'_, M>,
        window: &[JournalEntry],
        days: &DayMap,
        now_epoch_secs: u64,
    ) -> Result<AlertChange, AnalysisError> {
        let fresh = self.state.unprocessed(window);
        if fresh.is_empty() {
            return Ok(AlertChange {
                added: 0,
                total: self.state.alerts.len(),
            });
        }

        let found = analyzer.alerts(&fresh, days)?;
        let alerts = merge_alerts(&self.state.alerts, found);
        let added = alerts.len() - self.state.alerts.len();

        let live = window_ids(window);
        let mut processed: BTreeSet<String> = self
            .state
            .processed_entry_ids
            .intersection(&live)
            .cloned()
            .collect();
        processed.extend(fresh.into_iter().map(|entry| entry.id));

        let next = AlertState {
            alerts,
            dismissed: self.state.dismissed.clone(),
            processed_entry_ids: processed,
            entries_hash: Some(ids_fingerprint(live.iter())),
            generated_at_epoch_secs: Some(now_epoch_secs),
        };
        let total = next.alerts.len();
        self.commit(next)?;
        info!(added, total, "alerts updated incrementally");
        Ok(AlertChange { added, total })
    }

    /// Gap scan over the whole window, told which headlines already exist.
    pub fn scan<M: ModelClient + ?Sized>(
        &mut self,
        analyzer: &CrossDayAnalyzer<'_, M>,
        window: &[JournalEntry],
        days: &DayMap,
    ) -> Result<AlertChange, AnalysisError> {
        let found = analyzer.missed_alerts(window, days, &self.state.alerts)?;
        let alerts = merge_alerts(&self.state.alerts, found);
        let added = alerts.len() - self.state.alerts.len();
        let next = AlertState {
            alerts,
            ..self.state.clone()
        };
        let total = next.alerts.len();
        self.commit(next)?;
        Ok(AlertChange { added, total })
    }

    /// Returns false when no current alert has that key.
    pub fn dismiss(&mut self, key: &str) -> Result<bool, StoreError> {
        if !self.state.alerts.iter().any(|alert| alert_key(alert) == key) {
            return Ok(false);
        }
        let mut next = self.state.clone();
        next.dismissed.insert(key.to_string());
        self.commit(next)?;
        Ok(true)
    }

    pub fn restore(&mut self, key: &str) -> Result<bool, StoreError> {
        if !self.state.dismissed.contains(key) {
            return Ok(false);
        }
        let mut next = self.state.clone();
        next.dismissed.remove(key);
        self.commit(next)?;
        Ok(true)
    }
}
