use crate::error::StoreError;
use crate::journal::local_store::{LocalStore, user_key};
use crate::journal::remote::Remote;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::warn;

/// A per-user singleton record (alert book, report, overrides) held in the
/// local store and optionally mirrored to one row of the remote state
/// table. The remote row wins when it is present and readable.
pub struct StateSlot<T> {
    local: LocalStore,
    remote: Option<Remote>,
    table: String,
    user_id: String,
    key: String,
    _record: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> StateSlot<T> {
    pub fn new(
        local: LocalStore,
        remote: Option<Remote>,
        table: &str,
        user_id: &str,
        key: &str,
    ) -> Self {
        Self {
            local,
            remote,
            table: table.to_string(),
            user_id: user_id.to_string(),
            key: key.to_string(),
            _record: PhantomData,
        }
    }

    pub fn local_only(local: LocalStore, user_id: &str, key: &str) -> Self {
        Self::new(local, None, "", user_id, key)
    }

    fn local_key(&self) -> String {
        user_key(&self.key, &self.user_id)
    }

    pub fn load(&self) -> Result<Option<T>, StoreError> {
        if let Some(remote) = &self.remote
            && let Some(payload) = remote.row(&self.user_id, &self.table, &self.key)
        {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(record) => {
                    self.local.update(&self.local_key(), |_| Some(payload))?;
                    return Ok(Some(record));
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "unreadable remote state row; using local copy");
                }
            }
        }
        self.local.get_as(&self.local_key())
    }

    /// Local write is synchronous; the remote row is queued.
    pub fn save(&self, record: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)
            .map_err(|err| StoreError::Local(format!("failed to encode {}: {err}", self.key)))?;
        self.local.set(&self.local_key(), &value)?;
        if let Some(remote) = &self.remote {
            remote.upsert(&self.user_id, &self.table, &self.key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::remote::testing::MemoryTable;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn remote_row_wins_and_refreshes_the_local_copy() {
        let tmp = tempdir().expect("tempdir");
        let table = Arc::new(MemoryTable::default());
        let remote = Remote::new(table.clone(), tmp.path().join("dead.jsonl"));
        let local = LocalStore::open(tmp.path().join("store.json"));
        let slot: StateSlot<Vec<String>> =
            StateSlot::new(local.clone(), Some(remote.clone()), "user_state", "u1", "report");

        slot.save(&vec!["local".to_string()]).expect("save");
        remote.flush();
        table.put("u1", "user_state", "report", json!(["remote"]));

        assert_eq!(slot.load().expect("load"), Some(vec!["remote".to_string()]));
        assert_eq!(
            local.get("report:u1").expect("get"),
            Some(json!(["remote"]))
        );
    }

    #[test]
    fn unreadable_remote_row_falls_back_to_local() {
        let tmp = tempdir().expect("tempdir");
        let table = Arc::new(MemoryTable::default());
        let remote = Remote::new(table.clone(), tmp.path().join("dead.jsonl"));
        let slot: StateSlot<Vec<u32>> = StateSlot::new(
            LocalStore::open(tmp.path().join("store.json")),
            Some(remote.clone()),
            "user_state",
            "u1",
            "numbers",
        );
        slot.save(&vec![1, 2]).expect("save");
        remote.flush();
        table.put("u1", "user_state", "numbers", json!("not a list"));
        assert_eq!(slot.load().expect("load"), Some(vec![1, 2]));
    }

    #[test]
    fn local_only_slot_starts_empty() {
        let tmp = tempdir().expect("tempdir");
        let slot: StateSlot<Vec<u32>> =
            StateSlot::local_only(LocalStore::open(tmp.path().join("store.json")), "u1", "hints");
        assert_eq!(slot.load().expect("load"), None);
    }
}
