//! Wiring: build the dispatcher and runner from configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use tracing::{debug, info};

use crate::actions::{ActionContext, ActionExecutor, Clinic};
use crate::config::{Backend, Config};
use crate::conversation::{ConversationService, HeuristicReasoner, LlmReasoner, Reasoner, SessionStore};
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::domain::ClinicSnapshot;
use crate::events::{AuditLog, EventBus, spawn_event_logger};
use crate::llm::create_client;
use crate::plan::{PlanRunner, RunnerConfig};
use crate::planner::{LlmPlanner, Planner, RulePlanner};
use crate::prompts::PromptLoader;

/// Project-local prompt overrides
const PROMPT_OVERRIDE_DIR: &str = ".autopilot/prompts";

/// Everything a front end needs to dispatch, run and undo commands
pub struct Autopilot {
    pub config: Config,
    pub clinic: Clinic,
    pub events: Arc<EventBus>,
    pub audit: AuditLog,
    pub dispatcher: Dispatcher,
    pub runner: PlanRunner,
}

impl Autopilot {
    /// Build from config, loading clinic data from `clinic.snapshot-path`
    pub fn from_config(config: Config) -> Result<Self> {
        debug!(backend = ?config.dispatch.backend, "Autopilot::from_config: called");
        let snapshot = match &config.clinic.snapshot_path {
            Some(path) => load_snapshot(path)?,
            None => {
                info!("No clinic snapshot configured, using the demo practice");
                ClinicSnapshot::demo(Utc::now())
            }
        };
        Self::build(config, snapshot, None)
    }

    /// Build over an explicit snapshot with a pinned clock
    pub fn with_snapshot(config: Config, snapshot: ClinicSnapshot, now: DateTime<Utc>) -> Result<Self> {
        Self::build(config, snapshot, Some(now))
    }

    fn build(config: Config, snapshot: ClinicSnapshot, now: Option<DateTime<Utc>>) -> Result<Self> {
        config.validate()?;
        let clinic = Clinic::new(snapshot);
        let events = Arc::new(EventBus::default());
        let audit = AuditLog::new();

        let (planner, reasoner): (Arc<dyn Planner>, Arc<dyn Reasoner>) = match config.dispatch.backend {
            Backend::Rules => {
                let reasoner = HeuristicReasoner::new(clinic.clone());
                let reasoner = match now {
                    Some(now) => reasoner.at(now),
                    None => reasoner,
                };
                (Arc::new(RulePlanner::new()), Arc::new(reasoner))
            }
            Backend::Llm => {
                let client = create_client(&config.llm).context("Failed to create LLM client")?;
                let max_tokens = config.llm.max_tokens;
                (
                    Arc::new(LlmPlanner::new(
                        client.clone(),
                        PromptLoader::new(PROMPT_OVERRIDE_DIR),
                        max_tokens,
                    )),
                    Arc::new(LlmReasoner::new(
                        client,
                        PromptLoader::new(PROMPT_OVERRIDE_DIR),
                        clinic.clone(),
                        max_tokens,
                    )),
                )
            }
        };

        let conversation = ConversationService::new(
            SessionStore::spawn(),
            reasoner,
            events.clone(),
            config.dispatch.recent_commands,
        );
        let dispatcher = Dispatcher::new(
            planner,
            conversation,
            clinic.clone(),
            events.clone(),
            DispatcherConfig::from(&config.dispatch),
        );
        let dispatcher = match now {
            Some(now) => dispatcher.at(now),
            None => dispatcher,
        };

        let runner = PlanRunner::new(
            Arc::new(ActionExecutor::standard()),
            ActionContext::new(clinic.clone()),
            events.clone(),
            audit.clone(),
            RunnerConfig::from(&config.executor),
        );

        if config.events.enabled {
            spawn_event_logger(events.clone(), &config.events.dir).context("Failed to start event logger")?;
            info!(dir = %config.events.dir.display(), "Event logging enabled");
        }

        Ok(Self {
            config,
            clinic,
            events,
            audit,
            dispatcher,
            runner,
        })
    }
}

/// Read a clinic snapshot; `.json` files are JSON, anything else YAML
pub fn load_snapshot(path: &Path) -> Result<ClinicSnapshot> {
    debug!(?path, "load_snapshot: called");
    let content = std::fs::read_to_string(path).context(format!("Failed to read clinic snapshot {}", path.display()))?;
    let snapshot = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).context("Failed to parse clinic snapshot JSON")?
    } else {
        serde_yaml::from_str(&content).context("Failed to parse clinic snapshot YAML")?
    };
    Ok(snapshot)
}

/// Default session id for the CLI
pub fn default_session_id() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    format!("cli-{}", user)
}

/// Where `ap` writes its own log file
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autopilot")
        .join("logs")
}
