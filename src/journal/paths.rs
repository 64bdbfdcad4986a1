use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct JournalPaths {
    pub home: PathBuf,
    pub entries_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub profile_file: PathBuf,
    pub config_file: PathBuf,
}

impl JournalPaths {
    pub fn under(home: PathBuf) -> Self {
        Self {
            entries_dir: home.join("entries"),
            state_dir: home.join("state"),
            logs_dir: home.join("logs"),
            locks_dir: home.join("locks"),
            profile_file: home.join("profile.md"),
            config_file: home.join("daylens.toml"),
            home,
        }
    }

    pub fn local_store_file(&self) -> PathBuf {
        self.state_dir.join("local_store.json")
    }

    pub fn entries_file(&self, user_id: &str) -> PathBuf {
        self.entries_dir.join(format!("{}.json", sanitize_user_id(user_id)))
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }

    pub fn dead_letter_log(&self) -> PathBuf {
        self.logs_dir.join("remote_dead_letter.jsonl")
    }
}

fn sanitize_user_id(user_id: &str) -> String {
    let cleaned: String = user_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "local".to_string()
    } else {
        cleaned
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<JournalPaths> {
    let home = match env::var("DAYLENS_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("daylens"),
    };
    let mut paths = JournalPaths::under(home);
    paths.logs_dir = env_or_default_path("DAYLENS_LOGS_DIR", paths.logs_dir);
    paths.profile_file = env_or_default_path("DAYLENS_PROFILE_FILE", paths.profile_file);
    paths.config_file = env_or_default_path("DAYLENS_CONFIG_PATH", paths.config_file);
    Ok(paths)
}
