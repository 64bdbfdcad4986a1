use crate::error::StoreError;
use crate::journal::legacy::normalize_day_analysis;
use crate::journal::local_store::{LocalStore, user_key};
use crate::journal::model::{DayAnalysis, parse_entry_date};
use crate::journal::remote::Remote;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const LOCAL_PREFIX: &str = "day_analyses";

pub type DayMap = BTreeMap<NaiveDate, DayAnalysis>;

/// Per-day analyses keyed by date, held locally and mirrored to a remote
/// table. Remote rows win on conflict; local-only dates survive the merge.
#[derive(Clone)]
pub struct AnalysisCache {
    local: LocalStore,
    remote: Option<Remote>,
    table: String,
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn canonical(raw: &Map<String, Value>) -> DayMap {
    raw.iter()
        .filter_map(|(key, value)| {
            let date = parse_entry_date(key)?;
            let day = normalize_day_analysis(value);
            day.is_available().then_some((date, day))
        })
        .collect()
}

fn encode(day: &DayAnalysis) -> Result<Value, StoreError> {
    serde_json::to_value(day)
        .map_err(|err| StoreError::Local(format!("failed to encode day analysis: {err}")))
}

impl AnalysisCache {
    pub fn new(local: LocalStore, remote: Option<Remote>, table: impl Into<String>) -> Self {
        Self {
            local,
            remote,
            table: table.into(),
        }
    }

    fn local_key(user_id: &str) -> String {
        user_key(LOCAL_PREFIX, user_id)
    }

    fn local_map(&self, user_id: &str) -> Result<Map<String, Value>, StoreError> {
        Ok(match self.local.get(&Self::local_key(user_id))? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    /// Local snapshot merged with the remote table; the merged result is
    /// written back as the new local snapshot.
    pub fn get(&self, user_id: &str) -> Result<DayMap, StoreError> {
        let Some(remote) = &self.remote else {
            return Ok(canonical(&self.local_map(user_id)?));
        };

        let rows: Vec<(String, Value)> = remote
            .rows(user_id, &self.table)
            .into_iter()
            .filter(|row| parse_entry_date(&row.key).is_some())
            .map(|row| (row.key, row.payload))
            .collect();
        debug!(user_id, remote_rows = rows.len(), "merging remote day analyses");

        let mut merged = Map::new();
        self.local.update(&Self::local_key(user_id), |current| {
            if let Some(Value::Object(map)) = current {
                merged = map;
            }
            for (key, payload) in rows {
                merged.insert(key, payload);
            }
            Some(Value::Object(merged.clone()))
        })?;
        Ok(canonical(&merged))
    }

    pub fn get_day(&self, user_id: &str, date: NaiveDate) -> Result<Option<DayAnalysis>, StoreError> {
        Ok(self.get(user_id)?.remove(&date))
    }

    /// Local write completes before returning; the remote write is queued.
    pub fn put(&self, user_id: &str, date: NaiveDate, day: &DayAnalysis) -> Result<(), StoreError> {
        let value = encode(day)?;
        let key = date_key(date);
        self.local.update(&Self::local_key(user_id), |current| {
            let mut map = match current {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            map.insert(key.clone(), value.clone());
            Some(Value::Object(map))
        })?;
        if let Some(remote) = &self.remote {
            remote.upsert(user_id, &self.table, &key, value);
        }
        Ok(())
    }

    /// Drops one date locally and queues the matching remote delete.
    /// Returns whether the local snapshot held that date.
    pub fn remove_day(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let key = date_key(date);
        let mut removed = false;
        self.local.update(&Self::local_key(user_id), |current| match current {
            Some(Value::Object(mut map)) => {
                removed = map.remove(&key).is_some();
                Some(Value::Object(map))
            }
            other => other,
        })?;
        if let Some(remote) = &self.remote {
            remote.delete(user_id, &self.table, &key);
        }
        Ok(removed)
    }

    pub fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.local.remove(&Self::local_key(user_id))?;
        if let Some(remote) = &self.remote {
            remote.clear(user_id, &self.table);
        }
        Ok(())
    }
}
