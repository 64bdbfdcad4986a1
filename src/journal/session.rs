use crate::error::{GatewayError, StoreError};
use crate::gemini::{DefaultGateway, gateway_from_config};
use crate::journal::alerts::AlertState;
use crate::journal::cache::AnalysisCache;
use crate::journal::config::{Credentials, JournalConfig, load_config, resolve_credentials};
use crate::journal::entries::{EntryStore, FileEntryStore};
use crate::journal::hints::HintState;
use crate::journal::local_store::{LocalStore, user_key};
use crate::journal::model::{GlobalReport, JournalEntry};
use crate::journal::notes::{MirroredPages, NotionWorkspace};
use crate::journal::overrides::OverrideMap;
use crate::journal::paths::{JournalPaths, resolve_paths};
use crate::journal::remote::{Remote, RestTable};
use crate::journal::state::StateSlot;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::sync::Arc;

const ALERTS_KEY: &str = "alerts";
const REPORT_KEY: &str = "report";
const HINTS_KEY: &str = "hints";
const OVERRIDES_KEY: &str = "action_overrides";
const NOTES_PAGES_KEY: &str = "notes_pages";

/// Everything one CLI invocation needs for one user, built once and passed
/// down explicitly.
pub struct Session {
    pub paths: JournalPaths,
    pub config: JournalConfig,
    pub credentials: Credentials,
    pub local: LocalStore,
    pub remote: Option<Remote>,
    pub entries: FileEntryStore,
    pub cache: AnalysisCache,
}

impl Session {
    pub fn open() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config(&paths)?;
        Self::build(paths, config, resolve_credentials())
    }

    pub fn build(paths: JournalPaths, config: JournalConfig, credentials: Credentials) -> Result<Self> {
        let local = LocalStore::open(paths.local_store_file());
        let remote = match config.remote.url.as_deref() {
            Some(url) => {
                let table = RestTable::new(url, credentials.remote_key.as_deref())
                    .context("failed to configure remote table")?;
                Some(Remote::new(Arc::new(table), paths.dead_letter_log()))
            }
            None => None,
        };
        let cache = AnalysisCache::new(local.clone(), remote.clone(), &config.remote.day_table);
        Ok(Self {
            entries: FileEntryStore::new(&paths),
            paths,
            config,
            credentials,
            local,
            remote,
            cache,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    fn synced_slot<T: Serialize + DeserializeOwned>(&self, key: &str) -> StateSlot<T> {
        StateSlot::new(
            self.local.clone(),
            self.remote.clone(),
            &self.config.remote.state_table,
            self.user_id(),
            key,
        )
    }

    pub fn alert_slot(&self) -> StateSlot<AlertState> {
        self.synced_slot(ALERTS_KEY)
    }

    pub fn report_slot(&self) -> StateSlot<GlobalReport> {
        self.synced_slot(REPORT_KEY)
    }

    pub fn overrides_slot(&self) -> StateSlot<OverrideMap> {
        self.synced_slot(OVERRIDES_KEY)
    }

    pub fn hints_slot(&self) -> StateSlot<HintState> {
        StateSlot::local_only(self.local.clone(), self.user_id(), HINTS_KEY)
    }

    pub fn gateway(&self) -> Result<DefaultGateway, GatewayError> {
        gateway_from_config(&self.config.model, &self.credentials)
    }

    pub fn list_entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        self.entries.list(self.user_id())
    }

    /// Free-text profile from `<home>/profile.md`, if present.
    pub fn profile_context(&self) -> Option<String> {
        fs::read_to_string(&self.paths.profile_file)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    }

    pub fn timezone(&self) -> Tz {
        self.config.analysis.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn now_local(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone()).naive_local()
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }

    pub fn notes_workspace(&self) -> Result<Option<(NotionWorkspace, String)>, StoreError> {
        let (Some(db), Some(token)) = (
            self.config.notes.database_id.as_deref(),
            self.credentials.notion_token.as_deref(),
        ) else {
            return Ok(None);
        };
        let workspace = NotionWorkspace::new(&self.config.notes.base_url, token)?;
        Ok(Some((workspace, db.to_string())))
    }

    pub fn mirrored_pages(&self) -> Result<MirroredPages, StoreError> {
        Ok(self
            .local
            .get_as(&user_key(NOTES_PAGES_KEY, self.user_id()))?
            .unwrap_or_default())
    }

    pub fn save_mirrored_pages(&self, pages: &MirroredPages) -> Result<(), StoreError> {
        self.local
            .set(&user_key(NOTES_PAGES_KEY, self.user_id()), pages)
    }

    /// Waits for queued remote writes so the process can report on them.
    pub fn flush_remote(&self) {
        if let Some(remote) = &self.remote {
            remote.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_only_session_uses_home_layout() {
        let tmp = tempdir().expect("tempdir");
        let paths = JournalPaths::under(tmp.path().to_path_buf());
        fs::create_dir_all(&paths.home).expect("home");
        fs::write(&paths.profile_file, "  runner, ADHD  \n").expect("profile");

        let session = Session::build(paths, JournalConfig::default(), Credentials::default())
            .expect("session");
        assert!(session.remote.is_none());
        assert_eq!(session.user_id(), "local");
        assert_eq!(session.profile_context().as_deref(), Some("runner, ADHD"));
        assert_eq!(session.timezone(), Tz::UTC);
        assert!(session.notes_workspace().expect("notes").is_none());
        assert!(session.gateway().is_err());

        let mut pages = MirroredPages::new();
        pages.insert("fp".into(), "page".into());
        session.save_mirrored_pages(&pages).expect("save");
        assert_eq!(session.mirrored_pages().expect("load"), pages);
    }
}
