//! siteintake-chat - interactive intake in the terminal
//!
//! Walks one session through the conversation, then generates and deploys
//! the site. Every answer is saved as it is given, so an interrupted chat
//! can be resumed with `--session`.

mod shared;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use shared::{phase_tracker_line, App, Collaborators};
use siteintake_core::format::short_id;
use siteintake_core::{Error, IntakeStep, SessionStatus};
use std::io::{BufRead, Write};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "siteintake-chat")]
#[command(about = "Interactive website intake")]
#[command(version)]
struct Args {
    /// Resume an existing session (unique prefix supported)
    #[arg(short, long)]
    session: Option<String>,

    /// Use the configured remote builder service
    #[arg(long)]
    remote: bool,
}

/// Word that confirms the review and starts generation
const CONFIRM: &str = "done";

fn main() -> Result<()> {
    let args = Args::parse();
    let app = App::start("siteintake-chat")?;
    let collaborators = app.collaborators(args.remote)?;

    let id = match &args.session {
        Some(prefix) => app.resolve_session_id(prefix)?,
        None => {
            let session = app
                .service
                .create_session()
                .context("failed to create session")?;
            println!(
                "Welcome! {} for {}.",
                app.config.pricing.plan_name,
                app.config.pricing.display_price()
            );
            session.id
        }
    };

    let resume_hint = format!("Resume any time with: siteintake-chat --session {}", short_id(&id));
    {
        let resume_hint = resume_hint.clone();
        let session_id = id.clone();
        let exit = app.exit_hook();
        // The main thread is usually blocked reading stdin, so exit from here.
        // Answers are saved as they are given.
        ctrlc::set_handler(move || {
            eprintln!("\n{}", resume_hint);
            tracing::info!(session_id = %session_id, "Chat interrupted");
            exit(130);
        })
        .context("failed to set Ctrl+C handler")?;
    }

    tracing::info!(session_id = %id, "Chat started");
    let outcome = run_chat(&app, &collaborators, &id);
    if outcome.is_ok() {
        tracing::info!(session_id = %id, "Chat finished");
    }

    match outcome? {
        ChatEnd::Deployed(url) => println!("\nYour site is live at {}", url),
        ChatEnd::Abandoned => println!("\nThis session was abandoned."),
        ChatEnd::Paused => println!("\n{}", resume_hint),
    }
    Ok(())
}

enum ChatEnd {
    Deployed(String),
    Abandoned,
    Paused,
}

fn run_chat(app: &App, collaborators: &Collaborators, id: &str) -> Result<ChatEnd> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut last_tracker = String::new();

    loop {
        let snapshot = app.service.snapshot(id)?;

        let tracker = phase_tracker_line(&snapshot);
        if tracker != last_tracker {
            println!("\n{}", tracker);
            last_tracker = tracker;
        }

        match snapshot.status {
            SessionStatus::InProgress => {
                println!("\nassistant> {}", app.service.next_prompt(id)?);
                if snapshot.current_step == IntakeStep::Review {
                    println!("(type '{}' to build your site)", CONFIRM);
                }

                print!("you> ");
                std::io::stdout().flush()?;
                let Some(line) = lines.next().transpose()? else {
                    return Ok(ChatEnd::Paused);
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let result = if snapshot.current_step == IntakeStep::Review
                    && line.eq_ignore_ascii_case(CONFIRM)
                {
                    app.service.advance_phase(id).map(|_| ())
                } else {
                    app.service.send(id, line).map(|_| ())
                };

                match result {
                    Ok(()) => {}
                    // Rejected answers leave the session as it was; ask again
                    Err(e) if e.is_recoverable() => println!("assistant> {}", e),
                    Err(e) => return Err(e.into()),
                }
            }

            SessionStatus::Generating => {
                let spinner = spinner("Building your site...")?;
                let result = app.service.generate(id, collaborators.generator());
                spinner.finish_and_clear();
                report_failure(result.map(|_| ()))?;
            }

            SessionStatus::Completed => {
                let spinner = spinner("Publishing...")?;
                let result = app.service.deploy(id, collaborators.deployer());
                spinner.finish_and_clear();
                report_failure(result.map(|_| ()))?;
            }

            SessionStatus::Deployed => {
                let session = app.service.get_session(id)?;
                let url = session
                    .generated_site
                    .and_then(|site| site.deployment_url)
                    .unwrap_or_default();
                return Ok(ChatEnd::Deployed(url));
            }

            SessionStatus::Error => {
                if !snapshot.can_retry {
                    return Ok(ChatEnd::Abandoned);
                }

                print!("Try again? [y/n/abandon] ");
                std::io::stdout().flush()?;
                let Some(line) = lines.next().transpose()? else {
                    return Ok(ChatEnd::Paused);
                };
                match line.trim().to_lowercase().as_str() {
                    "y" | "yes" => {
                        app.service.retry(id)?;
                    }
                    "abandon" => {
                        app.service.abandon(id)?;
                    }
                    _ => return Ok(ChatEnd::Paused),
                }
            }
        }
    }
}

/// Collaborator failures move the session to `error`; anything else is fatal
fn report_failure(result: siteintake_core::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ (Error::GenerationFailure(_) | Error::DeploymentFailure(_))) => {
            println!("Something went wrong: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Typing indicator shown while a collaborator runs
fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid spinner template")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}
