use crate::error::StoreError;
use crate::journal::model::Action;
use crate::journal::state::StateSlot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// User edits layered over the extracted actions of one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayOverrides {
    /// `Action::key()` values hidden from the effective list.
    pub disabled: BTreeSet<String>,
    pub added: Vec<Action>,
}

impl DayOverrides {
    fn is_empty(&self) -> bool {
        self.disabled.is_empty() && self.added.is_empty()
    }
}

pub type OverrideMap = BTreeMap<NaiveDate, DayOverrides>;

/// Extracted actions minus disabled keys, then manual additions.
pub fn effective_actions(extracted: &[Action], overrides: Option<&DayOverrides>) -> Vec<Action> {
    let Some(overrides) = overrides else {
        return extracted.to_vec();
    };
    extracted
        .iter()
        .filter(|action| !overrides.disabled.contains(&action.key()))
        .chain(
            overrides
                .added
                .iter()
                .filter(|action| !overrides.disabled.contains(&action.key())),
        )
        .cloned()
        .collect()
}

pub struct ActionOverrides {
    slot: StateSlot<OverrideMap>,
    map: OverrideMap,
}

impl ActionOverrides {
    pub fn load(slot: StateSlot<OverrideMap>) -> Result<Self, StoreError> {
        let map = slot.load()?.unwrap_or_default();
        Ok(Self { slot, map })
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<&DayOverrides> {
        self.map.get(&date)
    }

    fn save_with(&mut self, date: NaiveDate, day: DayOverrides) -> Result<(), StoreError> {
        let mut next = self.map.clone();
        if day.is_empty() {
            next.remove(&date);
        } else {
            next.insert(date, day);
        }
        self.slot.save(&next)?;
        self.map = next;
        Ok(())
    }

    /// Flips the action between active and disabled. Returns whether it is
    /// active afterwards.
    pub fn toggle(&mut self, date: NaiveDate, key: &str) -> Result<bool, StoreError> {
        let mut day = self.map.get(&date).cloned().unwrap_or_default();
        let active = if day.disabled.remove(key) {
            true
        } else {
            day.disabled.insert(key.to_string());
            false
        };
        self.save_with(date, day)?;
        Ok(active)
    }

    pub fn add(&mut self, date: NaiveDate, action: Action) -> Result<(), StoreError> {
        let mut day = self.map.get(&date).cloned().unwrap_or_default();
        day.disabled.remove(&action.key());
        day.added.retain(|existing| existing.key() != action.key());
        day.added.push(action);
        self.save_with(date, day)
    }
}
