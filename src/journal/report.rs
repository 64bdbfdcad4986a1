use crate::error::{AnalysisError, StoreError};
use crate::gemini::gateway::ModelClient;
use crate::journal::cache::DayMap;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::model::GlobalReport;
use crate::journal::state::StateSlot;

/// The single aggregate report. Replaced wholesale, and only once a new one
/// has been generated and saved.
pub struct ReportBook {
    slot: StateSlot<GlobalReport>,
    current: Option<GlobalReport>,
}

impl ReportBook {
    pub fn load(slot: StateSlot<GlobalReport>) -> Result<Self, StoreError> {
        let current = slot.load()?;
        Ok(Self { slot, current })
    }

    pub fn current(&self) -> Option<&GlobalReport> {
        self.current.as_ref()
    }

    pub fn generate<M: ModelClient + ?Sized>(
        &mut self,
        analyzer: &CrossDayAnalyzer<'_, M>,
        days: &DayMap,
        now_epoch_secs: u64,
    ) -> Result<&GlobalReport, AnalysisError> {
        let report = analyzer.global_report(days, now_epoch_secs)?;
        self.slot.save(&report)?;
        Ok(self.current.insert(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, ParseFailure};
    use crate::gemini::gateway::ModelOutput;
    use crate::gemini::gateway::testing::ScriptedModel;
    use crate::journal::config::ModelConfig;
    use crate::journal::local_store::LocalStore;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn failed_regeneration_keeps_the_previous_report() {
        let tmp = tempdir().expect("tempdir");
        let local = LocalStore::open(tmp.path().join("store.json"));
        let slot = || StateSlot::local_only(local.clone(), "u1", "report");
        let model = ScriptedModel::replying(vec![
            Ok(ModelOutput::Json(json!({"executiveSummary": "First", "moodTrend": "stable"}))),
            Err(GatewayError::Parse(ParseFailure { tail: "{".into() })),
        ]);
        let cfg = ModelConfig::default();
        let analyzer = CrossDayAnalyzer::new(&model, &cfg);

        let mut book = ReportBook::load(slot()).expect("load");
        assert!(book.current().is_none());
        let report = book.generate(&analyzer, &DayMap::new(), 7).expect("generate");
        assert_eq!(report.executive_summary, "First");

        book.generate(&analyzer, &DayMap::new(), 8)
            .expect_err("parse failure");
        assert_eq!(
            book.current().map(|r| r.executive_summary.as_str()),
            Some("First")
        );
        let reloaded = ReportBook::load(slot()).expect("reload");
        assert_eq!(reloaded.current().map(|r| r.generated_at_epoch_secs), Some(7));
    }
}
