//! siteintake - manage website intake sessions from the command line
//!
//! Every subcommand operates on the intake database and exits non-zero when
//! the session rejects the operation (out of sequence, invalid transition).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/siteintake/data.db (~/.local/share/siteintake/data.db)
//! - Logs: $XDG_STATE_HOME/siteintake/ (~/.local/state/siteintake/)
//! - Config: $XDG_CONFIG_HOME/siteintake/config.toml (~/.config/siteintake/config.toml)

mod shared;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use shared::{phase_tracker_line, App};
use siteintake_core::format::{format_relative_time, short_id, truncate};
use siteintake_core::{
    Config, FailureKind, IntakeSession, IntakeStep, RemoteSiteService, SessionFilter,
    SessionStatus, TrackerPhase,
};

#[derive(Parser)]
#[command(name = "siteintake")]
#[command(about = "Collect what a small business needs for its website, then build it")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new intake session
    New,

    /// Record an answer for a step
    Answer {
        /// Session ID (unique prefix supported)
        session: String,
        /// Step being answered (e.g. business-name)
        step: IntakeStep,
        /// The answer text
        answer: String,
        /// Question shown to the user (defaults to the scripted prompt)
        #[arg(long)]
        question: Option<String>,
    },

    /// Leave the review step and request site generation
    Advance { session: String },

    /// Complete the intake (same transition as advance, from review)
    Complete { session: String },

    /// Generate the site for a session in `generating`
    Generate {
        session: String,
        /// Use the configured remote builder service
        #[arg(long)]
        remote: bool,
    },

    /// Deploy a generated site
    Deploy {
        session: String,
        /// Use the configured remote builder service
        #[arg(long)]
        remote: bool,
    },

    /// Move a session into the error status
    Fail { session: String, cause: String },

    /// Retry a failed session
    Retry { session: String },

    /// Abandon a failed session
    Abandon { session: String },

    /// Show a session
    Show {
        session: String,
        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List sessions
    List {
        /// Only sessions with this status (e.g. in-progress, error)
        #[arg(short, long)]
        status: Option<SessionStatus>,
        /// Only sessions created in the last N days
        #[arg(long)]
        days: Option<i64>,
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the conversation transcript
    Transcript { session: String },

    /// Fail sessions stuck in generation
    Expire {
        /// Age in minutes (defaults to intake.generation_timeout_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },

    /// Show plan pricing
    Pricing,

    /// Show storage locations, session counts and builder reachability
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let app = App::start("siteintake")?;

    match args.command {
        Command::New => {
            let session = app
                .service
                .create_session()
                .context("failed to create session")?;
            println!("Session: {}", session.id);
            println!();
            println!("{}", app.service.next_prompt(&session.id)?);
        }

        Command::Answer {
            session,
            step,
            answer,
            question,
        } => {
            let id = app.resolve_session_id(&session)?;
            let question = match question {
                Some(question) => question,
                None => app.service.next_prompt(&id)?,
            };
            let turn = app.service.record_response(&id, step, &question, &answer)?;

            println!("Recorded {}. Now at: {}", step, turn.next_step);
            let session = app.service.get_session(&id)?;
            if session.accepts_answers() {
                println!();
                println!("{}", app.service.next_prompt(&id)?);
            }
        }

        Command::Advance { session } => {
            let id = app.resolve_session_id(&session)?;
            let step = app.service.advance_phase(&id)?;
            println!("Advanced to {}", step);
        }

        Command::Complete { session } => {
            let id = app.resolve_session_id(&session)?;
            let session = app.service.complete_intake(&id)?;
            println!("Intake complete. Status: {}", session.status);
        }

        Command::Generate { session, remote } => {
            let id = app.resolve_session_id(&session)?;
            let collaborators = app.collaborators(remote)?;
            let session = app.service.generate(&id, collaborators.generator())?;
            print_generated(&session);
        }

        Command::Deploy { session, remote } => {
            let id = app.resolve_session_id(&session)?;
            let collaborators = app.collaborators(remote)?;
            let session = app.service.deploy(&id, collaborators.deployer())?;
            if let Some(url) = deployment_url(&session) {
                println!("Deployed: {}", url);
            }
        }

        Command::Fail { session, cause } => {
            let id = app.resolve_session_id(&session)?;
            app.service.mark_error(&id, FailureKind::Other, &cause)?;
            println!("Session {} marked as failed", short_id(&id));
        }

        Command::Retry { session } => {
            let id = app.resolve_session_id(&session)?;
            let status = app.service.retry(&id)?;
            println!("Session {} restored to {}", short_id(&id), status);
        }

        Command::Abandon { session } => {
            let id = app.resolve_session_id(&session)?;
            app.service.abandon(&id)?;
            println!("Session {} abandoned", short_id(&id));
        }

        Command::Show { session, format } => {
            let id = app.resolve_session_id(&session)?;
            match format.as_str() {
                "json" => {
                    let snapshot = app.service.snapshot(&id)?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
                "text" => print_session(&app, &id)?,
                other => anyhow::bail!("unknown format '{}' (expected text or json)", other),
            }
        }

        Command::List {
            status,
            days,
            limit,
        } => {
            let sessions = app.service.list_sessions(&SessionFilter {
                status,
                since: days.map(|days| Utc::now() - chrono::Duration::days(days)),
                limit: Some(limit),
            })?;

            if sessions.is_empty() {
                println!("No sessions");
                return Ok(());
            }

            println!(
                "{:<10} {:<12} {:<14} {:<24} {:>9}  UPDATED",
                "ID", "STATUS", "STEP", "BUSINESS", "RESPONSES"
            );
            for summary in sessions {
                println!(
                    "{:<10} {:<12} {:<14} {:<24} {:>9}  {}",
                    short_id(&summary.id),
                    summary.status.as_str(),
                    summary.current_step.as_str(),
                    truncate(summary.business_name.as_deref().unwrap_or("-"), 24),
                    summary.response_count,
                    format_relative_time(summary.updated_at)
                );
            }
        }

        Command::Transcript { session } => {
            let id = app.resolve_session_id(&session)?;
            for message in app.service.transcript(&id)? {
                println!(
                    "[{}] {:<9} {}",
                    TrackerPhase::for_step(message.step).label(),
                    message.role.as_str(),
                    message.content
                );
            }
        }

        Command::Expire { minutes } => {
            let max_age = match minutes {
                Some(minutes) => chrono::Duration::minutes(i64::from(minutes)),
                None => app.config.intake.generation_timeout(),
            };
            let expired = app.service.expire_stalled(max_age)?;
            println!("Expired {} session(s)", expired.len());
            for id in expired {
                println!("  {}", id);
            }
        }

        Command::Pricing => {
            let pricing = &app.config.pricing;
            println!("{}: {}", pricing.plan_name, pricing.display_price());
            println!("API: {}", app.config.api.endpoint("sites"));
        }

        Command::Status => print_status(&app)?,
    }

    Ok(())
}

fn deployment_url(session: &IntakeSession) -> Option<&str> {
    session
        .generated_site
        .as_ref()
        .and_then(|site| site.deployment_url.as_deref())
}

fn print_generated(session: &IntakeSession) {
    let Some(site) = &session.generated_site else {
        return;
    };
    println!("Generated site ({} template)", site.template_id);
    println!("  Headline: {}", site.content.hero.headline);
    println!(
        "  Colors:   {} / {} / {}",
        site.color_scheme.primary, site.color_scheme.secondary, site.color_scheme.accent
    );
    println!("  Services: {}", site.content.services.len());
    println!("  CTA:      {}", site.content.call_to_action);
}

fn print_session(app: &App, id: &str) -> Result<()> {
    let session = app.service.get_session(id)?;
    let snapshot = app.service.snapshot(id)?;

    println!("Session:   {}", session.id);
    println!("Status:    {}", session.status);
    println!("Step:      {}", session.current_step.display_name());
    println!("Responses: {}", session.responses.len());
    println!("Created:   {}", format_relative_time(session.created_at));
    println!("Updated:   {}", format_relative_time(session.updated_at));
    println!();
    println!("{}", phase_tracker_line(&snapshot));

    if let Some(error) = &session.last_error {
        println!();
        println!("Error ({}): {}", error.kind.as_str(), error.cause);
        if snapshot.can_retry {
            println!("Retry with: siteintake retry {}", short_id(id));
        } else {
            println!("Session was abandoned");
        }
    }

    if let Some(url) = deployment_url(&session) {
        println!();
        println!("Live at: {}", url);
    } else if session.generated_site.is_some() {
        println!();
        println!("Site generated, not deployed yet");
    }

    if let Some(business) = app.service.get_business(id)? {
        println!();
        println!("Business: {} ({})", business.name, business.industry);
    }

    Ok(())
}

fn print_status(app: &App) -> Result<()> {
    println!("Config:   {}", Config::config_path().display());
    println!("Database: {}", Config::database_path().display());
    println!("Logs:     {}", siteintake_core::logging::log_file_path().display());
    println!();

    let counts = app.service.database().count_sessions_by_status()?;
    let statuses = [
        SessionStatus::InProgress,
        SessionStatus::Generating,
        SessionStatus::Completed,
        SessionStatus::Deployed,
        SessionStatus::Error,
    ];
    println!("Sessions:");
    for status in statuses {
        println!(
            "  {:<12} {}",
            status.as_str(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }
    println!();

    match RemoteSiteService::new(&app.config.generator, &app.config.api)? {
        Some(remote) => {
            let reachable = if remote.health_check() {
                "reachable"
            } else {
                "unreachable"
            };
            println!("Builder:  remote ({})", reachable);
        }
        None => println!(
            "Builder:  local templates ({})",
            app.config.generator.site_domain
        ),
    }

    Ok(())
}
