use crate::error::StoreError;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Opaque persistent key-value map backed by one JSON object file.
///
/// Every mutation is a locked read-modify-write that finishes before the
/// lock is released, and the file is replaced atomically.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

fn local_err(action: &str, path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Local(format!("failed to {action} {}: {err}", path.display()))
}

impl LocalStore {
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn lock(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| local_err("create", parent, err))?;
        }
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| local_err("open", &lock_path, err))?;
        file.lock_exclusive()
            .map_err(|err| local_err("lock", &lock_path, err))?;
        Ok(file)
    }

    fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw =
            fs::read_to_string(&self.path).map_err(|err| local_err("read", &self.path, err))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(local_err("parse", &self.path, "top level is not an object")),
            Err(err) => Err(local_err("parse", &self.path, err)),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp =
            NamedTempFile::new_in(&dir).map_err(|err| local_err("stage", &self.path, err))?;
        let data = serde_json::to_string_pretty(map)
            .map_err(|err| local_err("encode", &self.path, err))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .map_err(|err| local_err("write", &self.path, err))?;
        tmp.persist(&self.path)
            .map_err(|err| local_err("replace", &self.path, err.error))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock()?;
        Ok(self.read_map()?.remove(key))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| local_err(&format!("decode key `{key}` in"), &self.path, err))
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value)
            .map_err(|err| local_err(&format!("encode key `{key}` for"), &self.path, err))?;
        self.update(key, |_| Some(encoded))
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(key, |_| None)
    }

    /// Locked read-modify-write of a single key. Returning `None` deletes it.
    pub fn update<F>(&self, key: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        let _guard = self.lock()?;
        let mut map = self.read_map()?;
        let current = map.remove(key);
        if let Some(next) = f(current) {
            map.insert(key.to_string(), next);
        }
        self.write_map(&map)
    }
}

pub fn user_key(prefix: &str, user_id: &str) -> String {
    format!("{prefix}:{user_id}")
}
