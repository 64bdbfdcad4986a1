pub mod actions;
pub mod alerts;
pub mod analyze;
pub mod cache;
pub mod entry;
pub mod hints;
pub mod report;
pub mod status;
pub mod sync;
pub mod voice;

use crate::journal::model::parse_entry_date;
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Structured payload for `--json` output.
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.data = Some(serde_json::to_value(value)?);
        Ok(())
    }
}

pub fn parse_date_arg(raw: &str) -> Result<NaiveDate> {
    parse_entry_date(raw).ok_or_else(|| anyhow!("invalid date `{raw}`: expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_flip_ok_and_data_is_optional_in_json() {
        let mut report = CommandReport::new("status");
        report.detail("home=/tmp");
        let raw = serde_json::to_value(&report).expect("encode");
        assert!(raw.get("data").is_none());

        report.issue("remote unreachable");
        report.data(&vec![1, 2]).expect("data");
        let raw = serde_json::to_value(&report).expect("encode");
        assert_eq!(raw["ok"], false);
        assert_eq!(raw["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn date_args_are_validated() {
        assert!(parse_date_arg("2026-01-31").is_ok());
        assert!(parse_date_arg("31/01/2026").is_err());
    }
}
