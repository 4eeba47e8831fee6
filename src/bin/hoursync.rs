//! hoursync CLI — operator interface to the worklog sync engine.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hoursync::config::{Config, flag_var};
use hoursync::dates::WindowSpec;
use hoursync::engine::{self, Reconciler};
use hoursync::jira::{JiraClient, JiraConfig};
use hoursync::model::ServiceType;
use hoursync::source::{JiraSource, SmonSource, UpworkSource};
use hoursync::source::smon::SmonConfig;
use hoursync::source::upwork::UpworkConfig;
use hoursync::storage::Storage;

#[derive(Parser)]
#[command(name = "hoursync", about = "Sync worklogs from external trackers into the store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync one source's worklogs for a date window
    Sync {
        /// Which source to sync
        system: System,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Create missing profiles and accounts from the hour-report roster
    CreateAccounts {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Resolve the ticket reference embedded in a piece of text
    Resolve {
        /// Free text, e.g. a worklog memo
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum System {
    Upwork,
    Smon,
    Jira,
}

#[derive(Args)]
struct WindowArgs {
    /// Sync today only
    #[arg(long)]
    today: bool,
    /// Sync yesterday only
    #[arg(long)]
    yesterday: bool,
    /// Monday of this week through today
    #[arg(long)]
    this_week: bool,
    /// The previous full week (Monday through Sunday)
    #[arg(long)]
    prev_week: bool,
    /// The last N days ending today
    #[arg(long)]
    last_days: Option<u32>,
    /// Window start (YYYY-MM-DD); defaults to today
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Window end (YYYY-MM-DD); defaults to today
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl WindowArgs {
    fn spec(&self) -> WindowSpec {
        if self.today {
            WindowSpec::Today
        } else if self.yesterday {
            WindowSpec::Yesterday
        } else if self.this_week {
            WindowSpec::ThisWeek
        } else if self.prev_week {
            WindowSpec::PrevWeek
        } else if let Some(n) = self.last_days {
            WindowSpec::LastDays(n)
        } else {
            WindowSpec::Range {
                from: self.from,
                to: self.to,
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let cli = Cli::parse();

    let mut storage = Storage::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;

    // Issue linkage needs the Jira tracker, so subcommands that resolve
    // issues build the client; create-accounts runs without it.
    match cli.command {
        Command::Sync { system, window } => {
            let window = window.spec().resolve(Utc::now().date_naive());
            println!("Syncing date range {} to {}", window.from, window.to);

            let tracker = JiraClient::new(JiraConfig::from_env()?)?;
            let mut reconciler = Reconciler::new(
                storage,
                tracker.clone(),
                config.project_keys,
                config.issue_autoupdate,
            );

            let count = match system {
                System::Upwork => {
                    let source = UpworkSource::new(UpworkConfig::from_env()?)?;
                    reconciler.sync(&source, window.from, window.to).await?
                }
                System::Smon => {
                    let uids = reconciler.storage().account_uids(ServiceType::Smon)?;
                    let source = SmonSource::new(SmonConfig::from_env()?, uids)?;
                    reconciler.sync(&source, window.from, window.to).await?
                }
                System::Jira => {
                    let autocreate = flag_var("JIRA_AUTOCREATE_USERS", false);
                    let source = JiraSource::new(tracker, autocreate);
                    reconciler.sync(&source, window.from, window.to).await?
                }
            };

            println!("synced {count} worklogs");
        }
        Command::CreateAccounts { window } => {
            let window = window.spec().resolve(Utc::now().date_naive());
            let source = UpworkSource::new(UpworkConfig::from_env()?)?;
            let created =
                engine::create_accounts_from_roster(&mut storage, &source, window.from, window.to)
                    .await?;
            println!("created {created} accounts");
        }
        Command::Resolve { text } => {
            let tracker = JiraClient::new(JiraConfig::from_env()?)?;
            let mut reconciler = Reconciler::new(
                storage,
                tracker,
                config.project_keys,
                config.issue_autoupdate,
            );
            match reconciler.resolve_issue(&text).await? {
                Some(issue) => println!("{issue}\n{}", issue.url),
                None => println!("no issue reference found"),
            }
        }
    }

    Ok(())
}
