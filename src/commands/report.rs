use anyhow::{Context, Result, bail};

use crate::commands::CommandReport;
use crate::journal::audit;
use crate::journal::cross_day::CrossDayAnalyzer;
use crate::journal::guard::InFlightGuard;
use crate::journal::model::GlobalReport;
use crate::journal::report::ReportBook;
use crate::journal::session::Session;
use crate::journal::util::now_epoch_secs;

const GUARD_KIND: &str = "global-report";

#[derive(Debug, Clone, Copy)]
pub enum ReportAction {
    Generate,
    Show,
}

fn describe(report: &mut CommandReport, global: &GlobalReport) {
    report.detail(format!("generated_at={}", global.generated_at_epoch_secs));
    report.detail(format!("mood_trend={}", global.mood_trend.label()));
    report.detail(global.executive_summary.clone());
    for observation in &global.observations {
        report.detail(format!("observation: {}", observation.text));
    }
    for hypothesis in &global.hypotheses {
        report.detail(format!(
            "hypothesis ({}%): {}",
            hypothesis.confidence, hypothesis.text
        ));
    }
    for substance in &global.substance_analyses {
        report.detail(format!(
            "substance: {} - {}",
            substance.name, substance.observed_effects
        ));
    }
    for rec in &global.recommendations {
        report.detail(format!("recommendation [{}]: {}", rec.priority.label(), rec.text));
    }
    if let Some(routine) = &global.ideal_routine {
        for slot in routine {
            report.detail(format!("routine {}: {}", slot.time, slot.activity));
        }
    }
    for experiment in &global.experiments {
        report.detail(format!("experiment: {}", experiment.title));
    }
}

pub fn run(action: ReportAction) -> Result<CommandReport> {
    let session = Session::open()?;
    let mut book = ReportBook::load(session.report_slot())?;

    match action {
        ReportAction::Show => {
            let mut report = CommandReport::new("report show");
            match book.current() {
                Some(global) => {
                    describe(&mut report, global);
                    report.data(global)?;
                }
                None => report.detail("no report generated yet"),
            }
            Ok(report)
        }
        ReportAction::Generate => {
            let mut report = CommandReport::new("report generate");
            let _guard = InFlightGuard::acquire(&session.paths, GUARD_KIND)?;
            let days = session.cache.get(session.user_id())?;
            if days.is_empty() {
                bail!("no analyzed days yet: run `daylens analyze` first");
            }
            let gateway = session
                .gateway()
                .context("model gateway is not configured")?;
            let analyzer = CrossDayAnalyzer::new(&gateway, &session.config.model);
            match book.generate(&analyzer, &days, now_epoch_secs()?) {
                Ok(global) => {
                    audit::record(
                        &session.paths,
                        "global_report",
                        "ok",
                        &format!("days={}", days.len()),
                    );
                    describe(&mut report, global);
                    report.data(global)?;
                }
                Err(err) => {
                    audit::record(&session.paths, "global_report", "failed", &err.to_string());
                    report.issue(format!(
                        "report generation failed [{}]: {err}",
                        err.kind().as_str()
                    ));
                    if let Some(previous) = book.current() {
                        report.detail("keeping the previous report");
                        report.data(previous)?;
                    }
                }
            }
            session.flush_remote();
            Ok(report)
        }
    }
}
