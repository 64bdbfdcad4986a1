use crate::journal::paths::JournalPaths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

include!(concat!(env!("OUT_DIR"), "/daylens_env_allowlist.rs"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationProfile {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl GenerationProfile {
    const fn new(max_output_tokens: u32, temperature: f32) -> Self {
        Self {
            max_output_tokens,
            temperature,
        }
    }
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self::new(8192, 0.3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub base_url: String,
    pub retries: u32,
    pub request_timeout_secs: u64,
    pub day: GenerationProfile,
    pub report: GenerationProfile,
    pub alerts: GenerationProfile,
    pub hints: GenerationProfile,
    pub voice: GenerationProfile,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            retries: 3,
            request_timeout_secs: 120,
            day: GenerationProfile::new(16_384, 0.2),
            report: GenerationProfile::new(32_768, 0.4),
            alerts: GenerationProfile::new(8192, 0.3),
            hints: GenerationProfile::new(1024, 0.8),
            voice: GenerationProfile::new(4096, 0.3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub prior_days: usize,
    pub alert_window_days: i64,
    pub hint_entries: usize,
    pub hint_stale_secs: u64,
    pub timezone: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            prior_days: 3,
            alert_window_days: 14,
            hint_entries: 5,
            hint_stale_secs: 21_600,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub day_table: String,
    pub state_table: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            day_table: "day_analyses".to_string(),
            state_table: "user_state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub database_id: Option<String>,
    pub base_url: String,
    pub auto_sync: bool,
    pub min_interval_ms: u64,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            database_id: None,
            base_url: "https://api.notion.com".to_string(),
            auto_sync: false,
            min_interval_ms: 350,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub user_id: String,
    pub model: ModelConfig,
    pub analysis: AnalysisConfig,
    pub remote: RemoteConfig,
    pub notes: NotesConfig,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            model: ModelConfig::default(),
            analysis: AnalysisConfig::default(),
            remote: RemoteConfig::default(),
            notes: NotesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialJournalConfig {
    user_id: Option<String>,
    model: Option<ModelConfig>,
    analysis: Option<AnalysisConfig>,
    remote: Option<RemoteConfig>,
    notes: Option<NotesConfig>,
}

/// Secrets never live in the TOML file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub proxy_url: Option<String>,
    pub remote_key: Option<String>,
    pub notion_token: Option<String>,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_non_empty(var).unwrap_or_else(|| fallback.to_string())
}

pub fn resolve_credentials() -> Credentials {
    Credentials {
        gemini_api_key: env_non_empty("DAYLENS_GEMINI_API_KEY")
            .or_else(|| env_non_empty("GEMINI_API_KEY")),
        proxy_url: env_non_empty("DAYLENS_PROXY_URL"),
        remote_key: env_non_empty("DAYLENS_REMOTE_KEY"),
        notion_token: env_non_empty("NOTION_TOKEN"),
    }
}

fn check_profile(name: &str, profile: &GenerationProfile) -> Result<()> {
    if profile.max_output_tokens == 0 {
        return Err(anyhow!("invalid {name} max_output_tokens: must be >= 1"));
    }
    if !(0.0..=2.0).contains(&profile.temperature) {
        return Err(anyhow!("invalid {name} temperature: require 0.0 <= t <= 2.0"));
    }
    Ok(())
}

fn validate(cfg: &JournalConfig) -> Result<()> {
    if cfg.user_id.trim().is_empty() {
        return Err(anyhow!("invalid user id: cannot be empty"));
    }
    if cfg.model.model.trim().is_empty() {
        return Err(anyhow!("invalid model name: cannot be empty"));
    }
    if cfg.model.retries > 10 {
        return Err(anyhow!("invalid model retries: must be <= 10"));
    }
    if cfg.model.request_timeout_secs == 0 {
        return Err(anyhow!("invalid model request timeout: must be >= 1 second"));
    }
    check_profile("day", &cfg.model.day)?;
    check_profile("report", &cfg.model.report)?;
    check_profile("alerts", &cfg.model.alerts)?;
    check_profile("hints", &cfg.model.hints)?;
    check_profile("voice", &cfg.model.voice)?;
    if cfg.analysis.alert_window_days < 1 {
        return Err(anyhow!("invalid alert window: must be >= 1 day"));
    }
    if cfg.analysis.hint_entries == 0 {
        return Err(anyhow!("invalid hint entry count: must be >= 1"));
    }
    if cfg.analysis.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(anyhow!(
            "invalid timezone `{}`: use an IANA name such as Europe/Berlin",
            cfg.analysis.timezone
        ));
    }
    if cfg.notes.min_interval_ms == 0 {
        return Err(anyhow!("invalid notes min interval: must be >= 1 ms"));
    }
    Ok(())
}

fn merge_file_config(base: &mut JournalConfig, paths: &JournalPaths) -> Result<()> {
    let path = &paths.config_file;
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialJournalConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse daylens config {}: {err}", path.display()))?;
    if let Some(user_id) = parsed.user_id {
        base.user_id = user_id;
    }
    if let Some(model) = parsed.model {
        base.model = model;
    }
    if let Some(analysis) = parsed.analysis {
        base.analysis = analysis;
    }
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    if let Some(notes) = parsed.notes {
        base.notes = notes;
    }
    Ok(())
}

pub fn load_config(paths: &JournalPaths) -> Result<JournalConfig> {
    let mut cfg = JournalConfig::default();
    merge_file_config(&mut cfg, paths)?;

    cfg.user_id = env_or_string("DAYLENS_USER_ID", &cfg.user_id);
    cfg.model.model = env_or_string("DAYLENS_MODEL", &cfg.model.model);
    cfg.model.base_url = env_or_string("DAYLENS_GEMINI_BASE_URL", &cfg.model.base_url);
    cfg.model.retries = env_or_u64("DAYLENS_MODEL_RETRIES", u64::from(cfg.model.retries))
        .try_into()
        .unwrap_or(cfg.model.retries);
    cfg.model.request_timeout_secs =
        env_or_u64("DAYLENS_REQUEST_TIMEOUT_SECS", cfg.model.request_timeout_secs);
    cfg.analysis.timezone = env_or_string("DAYLENS_TIMEZONE", &cfg.analysis.timezone);
    cfg.analysis.hint_stale_secs =
        env_or_u64("DAYLENS_HINT_STALE_SECS", cfg.analysis.hint_stale_secs);
    if let Some(url) = env_non_empty("DAYLENS_REMOTE_URL") {
        cfg.remote.url = Some(url);
    }
    if let Some(db) = env_non_empty("DAYLENS_NOTES_DATABASE_ID") {
        cfg.notes.database_id = Some(db);
    }
    cfg.notes.auto_sync = env_or_bool("DAYLENS_NOTES_AUTO_SYNC", cfg.notes.auto_sync);
    cfg.notes.base_url = env_or_string("DAYLENS_NOTES_BASE_URL", &cfg.notes.base_url);

    validate(&cfg)?;
    Ok(cfg)
}

/// `DAYLENS_*` variables set in the environment that no code reads.
pub fn unknown_env_keys() -> Vec<String> {
    let mut out: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("DAYLENS_"))
        .filter(|key| !GENERATED_DAYLENS_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn defaults_validate() {
        validate(&JournalConfig::default()).expect("defaults are valid");
    }

    #[test]
    fn partial_sections_fill_remaining_fields_with_defaults() {
        let tmp = tempdir().expect("tempdir");
        let paths = JournalPaths::under(tmp.path().to_path_buf());
        fs::write(
            &paths.config_file,
            "[model]\nretries = 1\n\n[model.day]\ntemperature = 0.1\n\n[analysis]\ntimezone = \"Europe/Berlin\"\n",
        )
        .expect("write config");

        let mut cfg = JournalConfig::default();
        merge_file_config(&mut cfg, &paths).expect("merge");
        assert_eq!(cfg.model.retries, 1);
        assert_eq!(cfg.model.model, "gemini-2.5-flash");
        assert_eq!(cfg.model.day.temperature, 0.1);
        assert_eq!(cfg.model.day.max_output_tokens, 8192);
        assert_eq!(cfg.analysis.timezone, "Europe/Berlin");
        assert_eq!(cfg.analysis.alert_window_days, 14);
        validate(&cfg).expect("valid");
    }

    #[test]
    fn validate_rejects_unknown_timezone_and_hot_temperature() {
        let mut cfg = JournalConfig::default();
        cfg.analysis.timezone = "Mars/Olympus".into();
        assert!(validate(&cfg).is_err());

        let mut cfg = JournalConfig::default();
        cfg.model.report.temperature = 3.5;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let paths = JournalPaths::under(PathBuf::from("/nonexistent/daylens"));
        let mut cfg = JournalConfig::default();
        merge_file_config(&mut cfg, &paths).expect("merge");
        assert_eq!(cfg.user_id, "local");
    }

    #[test]
    fn generated_allowlist_covers_keys_read_here() {
        assert!(GENERATED_DAYLENS_ENV_ALLOWLIST.contains(&"DAYLENS_USER_ID"));
        assert!(GENERATED_DAYLENS_ENV_ALLOWLIST.contains(&"DAYLENS_PROXY_URL"));
    }
}
