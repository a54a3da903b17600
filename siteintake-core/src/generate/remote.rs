//! Blocking adapter over [`GenerationClient`]

use crate::config::{ApiConfig, GeneratorConfig};
use crate::error::{Error, Result};
use crate::types::{GeneratedSiteConfig, IntakeSession};

use super::client::GenerationClient;
use super::{SiteDeployer, SiteGenerator};

/// Remote builder service exposed through the synchronous collaborator traits.
///
/// Owns a current-thread runtime and blocks on each request, so it must not
/// be called from inside another tokio runtime.
pub struct RemoteSiteService {
    client: GenerationClient,
    runtime: tokio::runtime::Runtime,
}

impl RemoteSiteService {
    /// Create the service from configuration
    ///
    /// Returns None if the generator is not enabled or not properly configured.
    pub fn new(config: &GeneratorConfig, api: &ApiConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        let client = GenerationClient::new(config.clone(), api)?;
        Ok(Some(Self { client, runtime }))
    }

    /// Check if the builder service is reachable (blocking)
    pub fn health_check(&self) -> bool {
        self.runtime.block_on(self.client.health_check())
    }
}

impl SiteGenerator for RemoteSiteService {
    fn name(&self) -> &str {
        "remote"
    }

    fn generate(&self, session: &IntakeSession) -> Result<GeneratedSiteConfig> {
        let mut site = self.runtime.block_on(self.client.generate(session))?;
        // The URL is only known once deployed
        site.deployment_url = None;
        Ok(site)
    }
}

impl SiteDeployer for RemoteSiteService {
    fn name(&self) -> &str {
        "remote"
    }

    fn deploy(&self, session: &IntakeSession, site: &GeneratedSiteConfig) -> Result<String> {
        let response = self.runtime.block_on(self.client.deploy(session, site))?;
        Ok(response.url)
    }
}
