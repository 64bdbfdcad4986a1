use crate::error::StoreError;
use crate::journal::util::{now_epoch_secs, truncate_with_ellipsis};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const REMOTE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub key: String,
    pub payload: Value,
}

/// Per-user key/value rows in a hosted table. Last writer wins per
/// `(user_id, key)`.
pub trait RemoteTable: Send + Sync {
    fn upsert(&self, user_id: &str, table: &str, key: &str, payload: &Value)
    -> Result<(), StoreError>;
    fn select(&self, user_id: &str, table: &str) -> Result<Vec<RemoteRow>, StoreError>;
    fn delete(&self, user_id: &str, table: &str, key: &str) -> Result<(), StoreError>;
    fn clear(&self, user_id: &str, table: &str) -> Result<(), StoreError>;
}

/// PostgREST-style table access.
pub struct RestTable {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestTable {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REMOTE_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::Remote(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key.as_deref() {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    fn execute(&self, request: RequestBuilder, action: &str) -> Result<String, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|err| StoreError::Remote(format!("{action}: {}", err.without_url())))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| StoreError::Remote(format!("{action}: {}", err.without_url())))?;
        if !status.is_success() {
            return Err(StoreError::Remote(format!(
                "{action} returned {status}: {}",
                truncate_with_ellipsis(&body, 200)
            )));
        }
        Ok(body)
    }
}

impl RemoteTable for RestTable {
    fn upsert(
        &self,
        user_id: &str,
        table: &str,
        key: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let row = json!({ "user_id": user_id, "key": key, "payload": payload });
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", "user_id,key")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row);
        self.execute(request, &format!("upsert {table}/{key}"))?;
        Ok(())
    }

    fn select(&self, user_id: &str, table: &str) -> Result<Vec<RemoteRow>, StoreError> {
        let filter = format!("eq.{user_id}");
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("user_id", filter.as_str()), ("select", "key,payload")]);
        let body = self.execute(request, &format!("select {table}"))?;
        serde_json::from_str(&body)
            .map_err(|err| StoreError::Remote(format!("select {table}: unreadable rows: {err}")))
    }

    fn delete(&self, user_id: &str, table: &str, key: &str) -> Result<(), StoreError> {
        let user_filter = format!("eq.{user_id}");
        let key_filter = format!("eq.{key}");
        let request = self.client.delete(self.table_url(table)).query(&[
            ("user_id", user_filter.as_str()),
            ("key", key_filter.as_str()),
        ]);
        self.execute(request, &format!("delete {table}/{key}"))?;
        Ok(())
    }

    fn clear(&self, user_id: &str, table: &str) -> Result<(), StoreError> {
        let filter = format!("eq.{user_id}");
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("user_id", filter.as_str())]);
        self.execute(request, &format!("clear {table}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MirrorOp {
    Upsert {
        user_id: String,
        table: String,
        key: String,
        payload: Value,
    },
    Delete {
        user_id: String,
        table: String,
        key: String,
    },
    Clear {
        user_id: String,
        table: String,
    },
}

impl MirrorOp {
    fn apply(&self, remote: &dyn RemoteTable) -> Result<(), StoreError> {
        match self {
            MirrorOp::Upsert {
                user_id,
                table,
                key,
                payload,
            } => remote.upsert(user_id, table, key, payload),
            MirrorOp::Delete {
                user_id,
                table,
                key,
            } => remote.delete(user_id, table, key),
            MirrorOp::Clear { user_id, table } => remote.clear(user_id, table),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeadLetter<'a> {
    at_epoch_secs: u64,
    error: String,
    #[serde(flatten)]
    op: &'a MirrorOp,
}

enum Job {
    Apply(MirrorOp),
    Flush(Sender<()>),
}

/// Best-effort background writer. Callers hand over an op and return
/// immediately; failures are logged and appended to a dead-letter file.
/// Dropping the mirror drains whatever is still queued.
pub struct RemoteMirror {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

fn record_dead_letter(path: &Path, op: &MirrorOp, err: &StoreError) {
    let letter = DeadLetter {
        at_epoch_secs: now_epoch_secs().unwrap_or(0),
        error: err.to_string(),
        op,
    };
    let line = match serde_json::to_string(&letter) {
        Ok(line) => line,
        Err(encode_err) => {
            warn!(error = %encode_err, "failed to encode dead letter");
            return;
        }
    };
    if let Some(parent) = path.parent()
        && let Err(io_err) = fs::create_dir_all(parent)
    {
        warn!(error = %io_err, path = %parent.display(), "failed to create dead-letter dir");
        return;
    }
    let appended = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(format!("{line}\n").as_bytes()));
    if let Err(io_err) = appended {
        warn!(error = %io_err, path = %path.display(), "failed to append dead letter");
    }
}

fn run_worker(remote: Arc<dyn RemoteTable>, dead_letter: PathBuf, jobs: Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Apply(op) => match op.apply(remote.as_ref()) {
                Ok(()) => debug!(?op, "remote mirror write applied"),
                Err(err) => {
                    warn!(error = %err, code = err.kind().as_str(), "remote mirror write failed");
                    record_dead_letter(&dead_letter, &op, &err);
                }
            },
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl RemoteMirror {
    pub fn spawn(remote: Arc<dyn RemoteTable>, dead_letter: PathBuf) -> Self {
        let (sender, jobs) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("remote-mirror".to_string())
            .spawn(move || run_worker(remote, dead_letter, jobs));
        match worker {
            Ok(handle) => Self {
                sender: Some(sender),
                worker: Some(handle),
            },
            Err(err) => {
                warn!(error = %err, "failed to start remote mirror; remote writes disabled");
                Self {
                    sender: None,
                    worker: None,
                }
            }
        }
    }

    pub fn submit(&self, op: MirrorOp) {
        let Some(sender) = &self.sender else {
            warn!(?op, "remote mirror unavailable; dropping write");
            return;
        };
        if let Err(err) = sender.send(Job::Apply(op)) {
            warn!(error = %err, "remote mirror queue closed; dropping write");
        }
    }

    /// Blocks until every op submitted so far has been attempted.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, wait) = mpsc::channel();
        if sender.send(Job::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
}

impl Drop for RemoteMirror {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("remote mirror worker panicked");
        }
    }
}

/// Read path plus mirrored write path for one user-scoped remote store.
/// Reads fail soft: an unreachable remote reads as empty.
#[derive(Clone)]
pub struct Remote {
    table: Arc<dyn RemoteTable>,
    mirror: Arc<Mutex<RemoteMirror>>,
}

impl Remote {
    pub fn new(table: Arc<dyn RemoteTable>, dead_letter: PathBuf) -> Self {
        let mirror = RemoteMirror::spawn(table.clone(), dead_letter);
        Self {
            table,
            mirror: Arc::new(Mutex::new(mirror)),
        }
    }

    pub fn rows(&self, user_id: &str, table: &str) -> Vec<RemoteRow> {
        match self.table.select(user_id, table) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, table, "remote read failed; using local state only");
                Vec::new()
            }
        }
    }

    pub fn row(&self, user_id: &str, table: &str, key: &str) -> Option<Value> {
        self.rows(user_id, table)
            .into_iter()
            .find(|row| row.key == key)
            .map(|row| row.payload)
    }

    fn submit(&self, op: MirrorOp) {
        match self.mirror.lock() {
            Ok(mirror) => mirror.submit(op),
            Err(_) => warn!("remote mirror lock poisoned; dropping write"),
        }
    }

    pub fn upsert(&self, user_id: &str, table: &str, key: &str, payload: Value) {
        self.submit(MirrorOp::Upsert {
            user_id: user_id.to_string(),
            table: table.to_string(),
            key: key.to_string(),
            payload,
        });
    }

    pub fn delete(&self, user_id: &str, table: &str, key: &str) {
        self.submit(MirrorOp::Delete {
            user_id: user_id.to_string(),
            table: table.to_string(),
            key: key.to_string(),
        });
    }

    pub fn clear(&self, user_id: &str, table: &str) {
        self.submit(MirrorOp::Clear {
            user_id: user_id.to_string(),
            table: table.to_string(),
        });
    }

    pub fn flush(&self) {
        if let Ok(mirror) = self.mirror.lock() {
            mirror.flush();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTable;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mirror_applies_writes_in_order() {
        let tmp = tempdir().expect("tempdir");
        let table = Arc::new(MemoryTable::default());
        let remote = Remote::new(table.clone(), tmp.path().join("dead.jsonl"));

        remote.upsert("u1", "days", "2026-01-01", json!({"summary": "a"}));
        remote.upsert("u1", "days", "2026-01-01", json!({"summary": "b"}));
        remote.flush();

        assert_eq!(
            table.get("u1", "days", "2026-01-01"),
            Some(json!({"summary": "b"}))
        );
        assert_eq!(remote.rows("u1", "days").len(), 1);

        remote.upsert("u1", "days", "2026-01-02", json!({"summary": "c"}));
        remote.delete("u1", "days", "2026-01-01");
        remote.flush();
        let keys: Vec<String> = remote.rows("u1", "days").into_iter().map(|row| row.key).collect();
        assert_eq!(keys, vec!["2026-01-02".to_string()]);

        remote.clear("u1", "days");
        remote.flush();
        assert!(remote.rows("u1", "days").is_empty());
    }

    #[test]
    fn failed_writes_land_in_the_dead_letter_file() {
        let tmp = tempdir().expect("tempdir");
        let dead = tmp.path().join("logs/dead.jsonl");
        let table = Arc::new(MemoryTable::default());
        table.set_failing(true);
        let remote = Remote::new(table.clone(), dead.clone());

        remote.upsert("u1", "days", "2026-01-01", json!({"summary": "a"}));
        remote.flush();

        let raw = fs::read_to_string(&dead).expect("dead letter");
        let line: Value = serde_json::from_str(raw.trim()).expect("json line");
        assert_eq!(line["op"], "upsert");
        assert_eq!(line["key"], "2026-01-01");
        assert!(line["error"].as_str().unwrap_or_default().contains("offline"));
        assert!(remote.rows("u1", "days").is_empty());
    }

    #[test]
    fn dropping_the_last_handle_drains_the_queue() {
        let tmp = tempdir().expect("tempdir");
        let table = Arc::new(MemoryTable::default());
        {
            let remote = Remote::new(table.clone(), tmp.path().join("dead.jsonl"));
            for day in 1..=5 {
                remote.upsert("u1", "days", &format!("2026-01-0{day}"), json!(day));
            }
        }
        assert_eq!(table.get("u1", "days", "2026-01-05"), Some(json!(5)));
    }
}
