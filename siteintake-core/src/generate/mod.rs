//! Site generation and deployment
//!
//! Generation turns a completed intake into a [`GeneratedSiteConfig`];
//! deployment publishes it and returns the public URL. Both are
//! collaborators of the intake service and may fail; the service turns
//! those failures into the session's `error` status.
//!
//! Two implementations ship:
//! - [`TemplateSiteGenerator`] + [`LocalDeployer`]: offline, deterministic
//! - [`RemoteSiteService`]: delegates both steps to an HTTP builder service
//!
//! Enable the remote service in `~/.config/siteintake/config.toml`:
//!
//! ```toml
//! [generator]
//! enabled = true
//! server_url = "https://builder.example.com"
//! api_key = "sk_live_xxxxxxxxxxxx"
//! ```

mod client;
mod remote;
mod template;

pub use client::{DeployResponse, GenerationClient};
pub use remote::RemoteSiteService;
pub use template::{slugify, LocalDeployer, TemplateSiteGenerator};

use crate::error::Result;
use crate::types::{GeneratedSiteConfig, IntakeSession};

/// Produces a site configuration from a completed intake.
pub trait SiteGenerator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Generate a site for `session`, which is in the `generating` status
    fn generate(&self, session: &IntakeSession) -> Result<GeneratedSiteConfig>;
}

/// Publishes a generated site.
pub trait SiteDeployer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deploy `site` and return its public URL
    fn deploy(&self, session: &IntakeSession, site: &GeneratedSiteConfig) -> Result<String>;
}
