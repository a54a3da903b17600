//! Setup and rendering shared by the `siteintake` and `siteintake-chat` binaries

use anyhow::{Context, Result};
use siteintake_core::intake::{PhaseStatus, SessionSnapshot, TrackerPhase};
use siteintake_core::logging::LoggingGuard;
use siteintake_core::{
    Config, Database, IntakeService, LocalDeployer, RemoteSiteService, SessionFilter,
    SiteDeployer, SiteGenerator, TemplateSiteGenerator,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a command needs once startup has succeeded
pub struct App {
    pub config: Config,
    pub service: IntakeService,
    log_guard: Arc<Mutex<Option<LoggingGuard>>>,
}

impl App {
    /// Load config, start logging and open the database at its XDG path
    pub fn start(name: &str) -> Result<Self> {
        // Ensure XDG environment variables are set before using core library
        Config::ensure_xdg_env();

        let config = Config::load().context("failed to load configuration")?;

        let log_guard = siteintake_core::logging::init(&config.logging)
            .context("failed to initialize logging")?;

        tracing::info!("{} starting", name);

        let db_path = Config::database_path();
        tracing::info!(path = %db_path.display(), "Opening database");

        let db = Database::open(&db_path).context("failed to open database")?;
        db.migrate().context("failed to run database migrations")?;

        Ok(Self {
            config,
            service: IntakeService::new(db),
            log_guard: Arc::new(Mutex::new(Some(log_guard))),
        })
    }

    /// Exit the process from a signal handler without losing buffered log lines
    #[allow(dead_code)] // Only siteintake-chat installs a Ctrl+C handler
    pub fn exit_hook(&self) -> impl Fn(i32) + Send + 'static {
        let log_guard = Arc::clone(&self.log_guard);
        move |code| {
            // Dropping the guard flushes the non-blocking writer
            drop(log_guard.lock().unwrap_or_else(PoisonError::into_inner).take());
            std::process::exit(code);
        }
    }

    /// Resolve a full session id from an id or unique prefix
    pub fn resolve_session_id(&self, prefix: &str) -> Result<String> {
        if self.service.database().get_session(prefix)?.is_some() {
            return Ok(prefix.to_string());
        }

        let matches: Vec<_> = self
            .service
            .list_sessions(&SessionFilter::default())?
            .into_iter()
            .filter(|s| s.id.starts_with(prefix))
            .collect();

        match matches.as_slice() {
            [] => anyhow::bail!("No session found matching '{}'", prefix),
            [only] => Ok(only.id.clone()),
            _ => anyhow::bail!(
                "'{}' matches {} sessions; use more characters",
                prefix,
                matches.len()
            ),
        }
    }

    /// Pick the generation and deployment collaborators
    pub fn collaborators(&self, remote: bool) -> Result<Collaborators> {
        if !remote {
            return Ok(Collaborators::Local {
                generator: TemplateSiteGenerator::new(self.config.brand.clone()),
                deployer: LocalDeployer::new(self.config.generator.site_domain.clone()),
            });
        }

        match RemoteSiteService::new(&self.config.generator, &self.config.api)
            .context("failed to create remote site service")?
        {
            Some(service) => Ok(Collaborators::Remote(service)),
            None => anyhow::bail!(
                "remote generation is not configured; set [generator] in {}",
                Config::config_path().display()
            ),
        }
    }
}

/// Generator and deployer chosen for a run
pub enum Collaborators {
    Local {
        generator: TemplateSiteGenerator,
        deployer: LocalDeployer,
    },
    Remote(RemoteSiteService),
}

impl Collaborators {
    pub fn generator(&self) -> &dyn SiteGenerator {
        match self {
            Collaborators::Local { generator, .. } => generator,
            Collaborators::Remote(service) => service,
        }
    }

    pub fn deployer(&self) -> &dyn SiteDeployer {
        match self {
            Collaborators::Local { deployer, .. } => deployer,
            Collaborators::Remote(service) => service,
        }
    }
}

/// One-line phase tracker, e.g. `[x] Discovery  [>] Audit  [ ] Features ...`
pub fn phase_tracker_line(snapshot: &SessionSnapshot) -> String {
    TrackerPhase::ALL
        .iter()
        .map(|phase| {
            let marker = match snapshot.phase_progress.get(phase).map(|p| p.status) {
                Some(PhaseStatus::Completed) => "x",
                Some(PhaseStatus::Active) => ">",
                _ => " ",
            };
            format!("[{}] {}", marker, phase.label())
        })
        .collect::<Vec<_>>()
        .join("  ")
}
