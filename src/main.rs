use clap::Parser;
use colored::*;
use std::path::PathBuf;

mod api;
mod config;
mod errors;
mod logging;
mod models;
mod sync;

use crate::api::google_tasks::GoogleTasksClient;
use crate::api::jira::JiraClient;
use crate::api::oauth::GoogleAuthenticator;
use crate::config::settings::Settings;
use crate::errors::SyncError;
use crate::sync::reconciler::{Reconciler, SyncOptions, SyncReport};
use crate::sync::throttle::{FixedDelay, NoDelay, Throttle};

#[derive(Parser)]
#[command(name = "jira-tasks-sync")]
#[command(version)]
#[command(about = "Mirror your assigned Jira issues into Google Tasks", long_about = None)]
struct Cli {
    /// Log every decision, not just writes
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: ~/.config/jira-tasks-sync/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Google task list that receives new tasks (overrides GOOGLE_TASKLIST_ID)
    #[arg(long, value_name = "ID")]
    tasklist: Option<String>,

    /// Show what would change without writing to Jira or Google
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}", format!("Logging disabled: {}", e).yellow());
    }

    match run(cli).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("\n{}", SyncError::from(e));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<SyncReport> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(tasklist) = cli.tasklist {
        settings.tasklist_id = Some(tasklist);
    }

    let auth = GoogleAuthenticator::from_files(&settings.credentials_path, &settings.token_path)?;
    let access_token = auth.access_token().await?;

    let jira = JiraClient::new(
        settings.jira_url.clone(),
        settings.jira_username.clone(),
        settings.jira_api_key.clone(),
    )
    .with_excluded_projects(settings.excluded_projects.clone());
    let tasks = GoogleTasksClient::new(access_token);
    let throttle: Box<dyn Throttle> = if cli.dry_run {
        Box::new(NoDelay)
    } else {
        Box::new(FixedDelay::new(settings.create_delay()))
    };

    let options = SyncOptions {
        jira_url: settings.jira_url.clone(),
        tasklist_id: settings.tasklist_id.clone(),
        due_date_source: settings.due_date_source,
        dry_run: cli.dry_run,
    };

    let report = Reconciler::new(&jira, &tasks, throttle.as_ref(), options).run().await?;

    tracing::info!(
        finished_at = %chrono::Utc::now().to_rfc3339(),
        "Completed Jira & Google Tasks sync: {}",
        report.summary()
    );

    Ok(report)
}

fn print_report(report: &SyncReport) {
    println!();
    println!("{}", "Jira → Google Tasks sync complete".green().bold());
    println!("  {} {}", "Issues:".bold(), report.issues.to_string().bright_white());
    println!("  {} {}", "Created:".bold(), report.created);
    println!("  {} {}", "Completed:".bold(), report.completed);
    println!("  {} {}", "Due dates → Jira:".bold(), report.jira_due_dates);
    println!("  {} {}", "Due dates → Google:".bold(), report.task_due_dates);
    println!("  {} {}", "Unchanged:".bold(), report.unchanged.to_string().dimmed());

    if report.writes() == 0 && report.failures == 0 {
        println!("  {}", "Everything was already in sync".dimmed());
    }
    if report.duplicates > 0 {
        println!(
            "  {}",
            format!("{} tasks share a title with another task", report.duplicates).yellow()
        );
    }
    if report.failures > 0 {
        println!(
            "  {}",
            format!("{} steps failed; see the log above", report.failures).red()
        );
    }
}
