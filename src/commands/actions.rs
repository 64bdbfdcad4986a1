use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use crate::commands::analyze::describe_action;
use crate::commands::{CommandReport, parse_date_arg};
use crate::journal::model::{Action, ActionType, normalize_entry_time};
use crate::journal::overrides::{ActionOverrides, effective_actions};
use crate::journal::session::Session;

#[derive(Debug, Clone)]
pub enum ActionsCommand {
    List,
    Toggle {
        key: String,
    },
    Add {
        name: String,
        kind: String,
        detail: Option<String>,
        time: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ActionRow {
    key: String,
    active: bool,
    manual: bool,
    #[serde(flatten)]
    action: Action,
}

pub fn run(date: &str, command: ActionsCommand) -> Result<CommandReport> {
    let session = Session::open()?;
    let date = parse_date_arg(date)?;
    let mut overrides = ActionOverrides::load(session.overrides_slot())?;

    let report = match command {
        ActionsCommand::List => {
            let mut report = CommandReport::new("actions list");
            let extracted = session
                .cache
                .get_day(session.user_id(), date)?
                .map(|day| day.actions)
                .unwrap_or_default();
            let day_overrides = overrides.for_date(date);
            let effective = effective_actions(&extracted, day_overrides);
            let mut rows: Vec<ActionRow> = extracted
                .into_iter()
                .map(|action| ActionRow {
                    key: action.key(),
                    active: effective.iter().any(|e| e.key() == action.key()),
                    manual: false,
                    action,
                })
                .collect();
            if let Some(day) = day_overrides {
                rows.extend(day.added.iter().cloned().map(|action| ActionRow {
                    key: action.key(),
                    active: true,
                    manual: true,
                    action,
                }));
            }
            for row in &rows {
                let marker = if row.active { "x" } else { " " };
                let origin = if row.manual { " [manual]" } else { "" };
                report.detail(format!(
                    "[{marker}] {}{origin}  key={}",
                    describe_action(&row.action),
                    row.key
                ));
            }
            report.data(&rows)?;
            report
        }
        ActionsCommand::Toggle { key } => {
            let mut report = CommandReport::new("actions toggle");
            let active = overrides.toggle(date, &key)?;
            report.detail(format!(
                "{date} {key} {}",
                if active { "enabled" } else { "disabled" }
            ));
            report
        }
        ActionsCommand::Add {
            name,
            kind,
            detail,
            time,
        } => {
            let mut report = CommandReport::new("actions add");
            if name.trim().is_empty() {
                bail!("action name must not be empty");
            }
            let time = time
                .as_deref()
                .map(|raw| {
                    normalize_entry_time(raw)
                        .ok_or_else(|| anyhow!("invalid time `{raw}`: expected HH:MM"))
                })
                .transpose()?;
            let action = Action {
                name: name.trim().to_string(),
                detail: detail.filter(|d| !d.trim().is_empty()),
                time,
                kind: ActionType::from_label(&kind),
            };
            report.detail(format!("{date} added {}", describe_action(&action)));
            overrides.add(date, action)?;
            report
        }
    };
    session.flush_remote();
    Ok(report)
}
