//! Assistant prompts for each intake step
//!
//! How the assistant phrases its questions is a pluggable concern: the
//! state machine only records whatever prompt was shown. [`ScriptedPrompts`]
//! is the built-in fixed script.

use crate::types::{IntakeSession, IntakeStep};

/// Produces the assistant prompt for a step.
pub trait PromptProvider: Send + Sync {
    /// Prompt to show while the session is at `step`
    fn prompt_for(&self, step: IntakeStep, session: &IntakeSession) -> String;
}

/// Fixed question script, personalized with the business name once known.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompts;

impl PromptProvider for ScriptedPrompts {
    fn prompt_for(&self, step: IntakeStep, session: &IntakeSession) -> String {
        let name = session
            .answer_for(IntakeStep::BusinessName)
            .map(str::trim)
            .filter(|n| !n.is_empty());

        match step {
            IntakeStep::Greeting => "Hi! I'll help you get a website up for your business. \
                 To start, what are you hoping your new site will do for you?"
                .to_string(),
            IntakeStep::BusinessName => "What's the name of your business?".to_string(),
            IntakeStep::Industry => match name {
                Some(name) => format!("Nice to meet you, {}! What industry are you in?", name),
                None => "What industry are you in?".to_string(),
            },
            IntakeStep::Services => {
                "What services or products do you offer? A comma-separated list works great."
                    .to_string()
            }
            IntakeStep::Branding => "Do you have brand colors or a style in mind? \
                 Color names or hex codes like #1d4ed8 both work."
                .to_string(),
            IntakeStep::Content => match name {
                Some(name) => format!(
                    "Tell me what makes {} special. This becomes the story on your homepage.",
                    name
                ),
                None => "Tell me what makes your business special. \
                     This becomes the story on your homepage."
                    .to_string(),
            },
            IntakeStep::Review => review_summary(session),
            IntakeStep::Generating => "Building your site now, this takes a moment...".to_string(),
            IntakeStep::Complete => match name {
                Some(name) => format!("The site for {} is ready!", name),
                None => "Your site is ready!".to_string(),
            },
        }
    }
}

fn review_summary(session: &IntakeSession) -> String {
    let mut lines = vec!["Here's what I have so far:".to_string()];
    for step in &IntakeStep::REQUIRED[1..] {
        if let Some(answer) = session.answer_for(*step) {
            lines.push(format!("- {}: {}", step.display_name(), answer.trim()));
        }
    }
    lines.push("Add anything I missed, or confirm to build your site.".to_string());
    lines.join("\n")
}
