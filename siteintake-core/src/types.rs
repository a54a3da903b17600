//! Core domain types for siteintake
//!
//! These types describe one intake conversation and everything it produces.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Intake session** | One end-to-end conversation collecting business information |
//! | **Step** | A named stage of the conversation with a fixed total order ([`IntakeStep`]) |
//! | **Response** | The structured answer bound to a step ([`IntakeResponse`]) |
//! | **Transcript** | The raw chat log ([`ConversationMessage`]), distinct from responses |
//! | **Generated site** | Template, colors and content produced once intake is complete |
//! | **Business** | The record materialized from a completed intake ([`BusinessInfo`]) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Steps
// ============================================

/// A stage of the intake conversation.
///
/// The declaration order is the conversation order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntakeStep {
    Greeting,
    BusinessName,
    Industry,
    Services,
    Branding,
    Content,
    Review,
    Generating,
    Complete,
}

impl IntakeStep {
    /// Every step, in conversation order
    pub const ALL: [IntakeStep; 9] = [
        IntakeStep::Greeting,
        IntakeStep::BusinessName,
        IntakeStep::Industry,
        IntakeStep::Services,
        IntakeStep::Branding,
        IntakeStep::Content,
        IntakeStep::Review,
        IntakeStep::Generating,
        IntakeStep::Complete,
    ];

    /// Steps that must each have at least one response before review can finish
    pub const REQUIRED: [IntakeStep; 6] = [
        IntakeStep::Greeting,
        IntakeStep::BusinessName,
        IntakeStep::Industry,
        IntakeStep::Services,
        IntakeStep::Branding,
        IntakeStep::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeStep::Greeting => "greeting",
            IntakeStep::BusinessName => "business-name",
            IntakeStep::Industry => "industry",
            IntakeStep::Services => "services",
            IntakeStep::Branding => "branding",
            IntakeStep::Content => "content",
            IntakeStep::Review => "review",
            IntakeStep::Generating => "generating",
            IntakeStep::Complete => "complete",
        }
    }

    /// Returns the display name for this step
    pub fn display_name(&self) -> &'static str {
        match self {
            IntakeStep::Greeting => "Welcome",
            IntakeStep::BusinessName => "Business name",
            IntakeStep::Industry => "Industry",
            IntakeStep::Services => "Services",
            IntakeStep::Branding => "Branding",
            IntakeStep::Content => "Content",
            IntakeStep::Review => "Review",
            IntakeStep::Generating => "Generating",
            IntakeStep::Complete => "Complete",
        }
    }

    /// Position of this step in the conversation (0-based)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The step that follows this one, if any
    pub fn next(&self) -> Option<IntakeStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Whether the conversation can only leave this step by answering it
    pub fn requires_answer(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl std::fmt::Display for IntakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntakeStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown intake step: {}", s))
    }
}

// ============================================
// Session status
// ============================================

/// Lifecycle status of an intake session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Conversation is collecting answers
    InProgress,
    /// Site generated, not yet deployed
    Completed,
    /// Site generation has been requested
    Generating,
    /// Site is live
    Deployed,
    /// A collaborator failed or the session was stopped
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Generating => "generating",
            SessionStatus::Deployed => "deployed",
            SessionStatus::Error => "error",
        }
    }

    /// Terminal statuses accept no further conversation mutations
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Deployed | SessionStatus::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "generating" => Ok(SessionStatus::Generating),
            "deployed" => Ok(SessionStatus::Deployed),
            "error" => Ok(SessionStatus::Error),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

// ============================================
// Responses and transcript
// ============================================

/// A structured answer collected under a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    /// Step the answer was collected under
    pub step: IntakeStep,
    /// Prompt shown to the user
    pub question: String,
    /// The user's answer
    pub answer: String,
    /// When the answer was recorded
    pub timestamp: DateTime<Utc>,
}

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Assistant => "assistant",
            MessageRole::User => "user",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assistant" => Ok(MessageRole::Assistant),
            "user" => Ok(MessageRole::User),
            _ => Err(format!("unknown message role: {}", s)),
        }
    }
}

/// A single turn of the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    /// Unique message identifier
    pub id: String,
    /// Session this message belongs to
    pub session_id: String,
    /// Who wrote it
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Step the conversation was at when the message was written
    pub step: IntakeStep,
    /// When the message was written
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ConversationMessage {
    pub fn new(
        session_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        step: IntakeStep,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            step,
            timestamp,
            metadata: None,
        }
    }
}

// ============================================
// Generated site
// ============================================

/// Colors applied to a generated site (hex strings, e.g. `#1d4ed8`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub text: String,
}

/// Hero section copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroContent {
    pub headline: String,
    pub subheadline: String,
}

/// A service or product listed on the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A customer quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub quote: String,
    pub author: String,
}

/// Structured page content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    pub hero: HeroContent,
    pub services: Vec<ServiceItem>,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
    pub call_to_action: String,
}

/// Output of the site generation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSiteConfig {
    /// Template identifier
    pub template_id: String,
    pub color_scheme: ColorScheme,
    pub content: SiteContent,
    /// Set once the site is deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    /// When generation finished
    pub generated_at: DateTime<Utc>,
}

// ============================================
// Business
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.email.is_none() && self.website.is_none()
    }
}

/// Opening hours for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessHours {
    /// Day label ("monday", "weekends", ...)
    pub day: String,
    pub opens: String,
    pub closes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

/// Business record materialized from a completed intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInfo {
    pub id: String,
    pub name: String,
    pub industry: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<Vec<BusinessHours>>,
    #[serde(default)]
    pub social_links: Vec<SocialLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Intake session
// ============================================

/// What went wrong when a session entered the `error` status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The site generation collaborator failed
    Generation,
    /// The deployment collaborator failed
    Deployment,
    /// Generation never finished and the watchdog gave up on it
    Stalled,
    /// Reported by an operator or another collaborator
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Generation => "generation",
            FailureKind::Deployment => "deployment",
            FailureKind::Stalled => "stalled",
            FailureKind::Other => "other",
        }
    }
}

/// Error details recorded on a session in the `error` status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionError {
    pub kind: FailureKind,
    pub cause: String,
    /// Status the session was in when the error happened (restored by retry)
    pub previous_status: SessionStatus,
    pub occurred_at: DateTime<Utc>,
    /// Abandoned sessions can no longer be retried
    #[serde(default)]
    pub abandoned: bool,
}

/// Records when the conversation cursor entered a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEntry {
    pub step: IntakeStep,
    pub entered_at: DateTime<Utc>,
}

/// One client's website-creation conversation.
///
/// Mutate it only through the state machine operations in
/// [`crate::intake`]; they keep the invariants on `responses`,
/// `current_step` and `status` intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSession {
    /// Unique identifier (UUID v4), immutable
    pub id: String,
    /// Link to the materialized business once created
    #[serde(default)]
    pub business_id: Option<String>,
    pub status: SessionStatus,
    pub current_step: IntakeStep,
    /// Append-only, in insertion order
    pub responses: Vec<IntakeResponse>,
    /// Append-only log of step entries, drives phase progress
    #[serde(default)]
    pub step_history: Vec<StepEntry>,
    #[serde(default)]
    pub generated_site: Option<GeneratedSiteConfig>,
    /// Present while `status == error`
    #[serde(default)]
    pub last_error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_and_next() {
        assert_eq!(IntakeStep::Greeting.next(), Some(IntakeStep::BusinessName));
        assert_eq!(IntakeStep::Content.next(), Some(IntakeStep::Review));
        assert_eq!(IntakeStep::Review.next(), Some(IntakeStep::Generating));
        assert_eq!(IntakeStep::Complete.next(), None);
        assert!(IntakeStep::Industry < IntakeStep::Services);
        assert_eq!(IntakeStep::Review.index(), 6);
    }

    #[test]
    fn test_step_string_forms() {
        for step in IntakeStep::ALL {
            assert_eq!(step.as_str().parse::<IntakeStep>().unwrap(), step);
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(json, format!("\"{}\"", step.as_str()));
        }
        assert!("business_name".parse::<IntakeStep>().is_err());
    }

    #[test]
    fn test_required_steps_need_answers() {
        assert!(IntakeStep::Greeting.requires_answer());
        assert!(IntakeStep::Content.requires_answer());
        assert!(!IntakeStep::Review.requires_answer());
        assert!(!IntakeStep::Generating.requires_answer());
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Generating,
            SessionStatus::Deployed,
            SessionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!(SessionStatus::Deployed.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Completed.is_terminal());
        assert_eq!(
            serde_json::to_string(&SessionStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
    }
}
