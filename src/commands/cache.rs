use anyhow::Result;

use crate::commands::CommandReport;
use crate::journal::session::Session;

#[derive(Debug, Clone, Copy)]
pub enum CacheAction {
    Show,
    Clear,
}

pub fn run(action: CacheAction) -> Result<CommandReport> {
    let session = Session::open()?;
    let user = session.user_id();
    match action {
        CacheAction::Show => {
            let mut report = CommandReport::new("cache show");
            let days = session.cache.get(user)?;
            for (date, day) in &days {
                report.detail(format!(
                    "{date} actions={} hash={} {}",
                    day.actions.len(),
                    day.entries_hash.as_deref().unwrap_or("-"),
                    day.summary
                ));
            }
            if days.is_empty() {
                report.detail("no analyzed days");
            }
            report.data(&days)?;
            Ok(report)
        }
        CacheAction::Clear => {
            let mut report = CommandReport::new("cache clear");
            session.cache.clear(user)?;
            session.flush_remote();
            report.detail(format!("cleared day analyses for {user}"));
            Ok(report)
        }
    }
}
