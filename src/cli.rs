use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::actions::ActionsCommand;
use crate::commands::alerts::AlertsAction;
use crate::commands::analyze::AnalyzeTarget;
use crate::commands::cache::CacheAction;
use crate::commands::entry::EntryAction;
use crate::commands::report::ReportAction;
use crate::commands::sync::SyncDirection;
use crate::commands::{self, CommandReport};

#[derive(Parser)]
#[command(
    name = "daylens",
    version,
    about = "Wellness journal with LLM day analysis, cross-day reports and alerts"
)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show paths, configuration and collaborator wiring
    Status,
    /// Journal entry operations
    Entry {
        #[command(subcommand)]
        command: EntryCommands,
    },
    /// Analyze one day, or every day whose entries changed
    Analyze {
        /// Day to analyze (YYYY-MM-DD)
        #[arg(long, conflicts_with = "stale", required_unless_present = "stale")]
        date: Option<String>,
        /// Analyze every date whose stored hash no longer matches its entries
        #[arg(long)]
        stale: bool,
    },
    /// Show the content fingerprint of a day's entries
    Hash {
        #[arg(long)]
        date: String,
    },
    /// Inspect or clear cached day analyses
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// View and edit the effective actions of a day
    Actions {
        #[command(subcommand)]
        command: ActionsCommands,
    },
    /// Cross-day report
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Alerts over the recent window
    Alerts {
        #[command(subcommand)]
        command: AlertsCommands,
    },
    /// Writing prompts drawn from recent entries
    Hints {
        /// Regenerate even when cached hints are fresh
        #[arg(long)]
        force: bool,
    },
    /// Turn a conversation transcript into a journal entry
    Voice {
        /// JSON array of {"speaker", "text"} objects
        #[arg(long)]
        transcript: PathBuf,
    },
    /// Mirror entries with the notes workspace
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum EntryCommands {
    /// Add an entry
    Add {
        text: String,
        /// Entry date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// Entry time (HH:MM)
        #[arg(long)]
        time: Option<String>,
    },
    /// List entries, optionally for one date
    List {
        #[arg(long)]
        date: Option<String>,
    },
    /// Edit an entry by id
    Edit {
        id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long, conflicts_with = "clear_time")]
        time: Option<String>,
        #[arg(long)]
        clear_time: bool,
    },
    /// Delete an entry by id
    Delete { id: String },
}

#[derive(Subcommand)]
enum CacheCommands {
    Show,
    Clear,
}

#[derive(Subcommand)]
enum ActionsCommands {
    /// Extracted and manual actions with their active state
    List {
        #[arg(long)]
        date: String,
    },
    /// Enable or disable an action by key (`name|type`)
    Toggle {
        #[arg(long)]
        date: String,
        key: String,
    },
    /// Add a manual action
    Add {
        #[arg(long)]
        date: String,
        name: String,
        #[arg(long = "type", default_value = "other")]
        kind: String,
        #[arg(long)]
        detail: Option<String>,
        #[arg(long)]
        time: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    Generate,
    Show,
}

#[derive(Subcommand)]
enum AlertsCommands {
    /// Active alerts
    List {
        /// Include dismissed alerts
        #[arg(long)]
        all: bool,
    },
    /// Regenerate every alert over the window
    Generate,
    /// Process only entries not seen by a previous pass
    Update,
    /// Look for alerts earlier passes missed
    Scan,
    Dismiss { key: String },
    Restore { key: String },
}

#[derive(Subcommand)]
enum SyncCommands {
    Push,
    Pull,
}

fn dispatch(command: Commands) -> Result<CommandReport> {
    match command {
        Commands::Status => commands::status::run(),
        Commands::Entry { command } => commands::entry::run(match command {
            EntryCommands::Add { text, date, time } => EntryAction::Add { text, date, time },
            EntryCommands::List { date } => EntryAction::List { date },
            EntryCommands::Edit {
                id,
                text,
                date,
                time,
                clear_time,
            } => EntryAction::Edit {
                id,
                text,
                date,
                time,
                clear_time,
            },
            EntryCommands::Delete { id } => EntryAction::Delete { id },
        }),
        Commands::Analyze { date, stale } => commands::analyze::run(match (date, stale) {
            (Some(date), false) => AnalyzeTarget::Date(date),
            (None, true) => AnalyzeTarget::Stale,
            _ => bail!("pass exactly one of --date or --stale"),
        }),
        Commands::Hash { date } => commands::analyze::run_hash(&date),
        Commands::Cache { command } => commands::cache::run(match command {
            CacheCommands::Show => CacheAction::Show,
            CacheCommands::Clear => CacheAction::Clear,
        }),
        Commands::Actions { command } => match command {
            ActionsCommands::List { date } => commands::actions::run(&date, ActionsCommand::List),
            ActionsCommands::Toggle { date, key } => {
                commands::actions::run(&date, ActionsCommand::Toggle { key })
            }
            ActionsCommands::Add {
                date,
                name,
                kind,
                detail,
                time,
            } => commands::actions::run(
                &date,
                ActionsCommand::Add {
                    name,
                    kind,
                    detail,
                    time,
                },
            ),
        },
        Commands::Report { command } => commands::report::run(match command {
            ReportCommands::Generate => ReportAction::Generate,
            ReportCommands::Show => ReportAction::Show,
        }),
        Commands::Alerts { command } => commands::alerts::run(match command {
            AlertsCommands::List { all } => AlertsAction::List { all },
            AlertsCommands::Generate => AlertsAction::Generate,
            AlertsCommands::Update => AlertsAction::Update,
            AlertsCommands::Scan => AlertsAction::Scan,
            AlertsCommands::Dismiss { key } => AlertsAction::Dismiss { key },
            AlertsCommands::Restore { key } => AlertsAction::Restore { key },
        }),
        Commands::Hints { force } => commands::hints::run(force),
        Commands::Voice { transcript } => commands::voice::run(&transcript),
        Commands::Sync { command } => commands::sync::run(match command {
            SyncCommands::Push => SyncDirection::Push,
            SyncCommands::Pull => SyncDirection::Pull,
        }),
    }
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for line in &report.details {
        println!("  {line}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = dispatch(cli.command)?;
    render(&report, cli.json)?;
    if !report.ok {
        bail!(
            "`{}` finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_requires_date_or_stale() {
        assert!(Cli::try_parse_from(["daylens", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["daylens", "analyze", "--stale"]).is_ok());
        assert!(
            Cli::try_parse_from(["daylens", "analyze", "--stale", "--date", "2026-01-01"])
                .is_err()
        );
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["daylens", "alerts", "list", "--json"]).expect("parse");
        assert!(cli.json);
    }
}
