//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults, then renders them with Handlebars.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::domain::{ClinicSnapshot, ConversationMessage, MessageRole, UserRole, format_cents};

/// Upcoming appointments listed in a prompt
const MAX_APPOINTMENTS: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct PatientLine {
    pub id: String,
    pub name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentLine {
    pub id: String,
    pub patient: String,
    pub label: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceLine {
    pub id: String,
    pub patient: String,
    pub amount: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub role: String,
    pub content: String,
}

/// Context for rendering prompt templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub today: String,
    pub now: String,
    pub role: String,
    pub current_page: Option<String>,
    pub patients: Vec<PatientLine>,
    pub appointments: Vec<AppointmentLine>,
    pub invoices: Vec<InvoiceLine>,
    pub recent_commands: Vec<String>,
    pub transcript: Vec<TranscriptLine>,
}

impl PromptContext {
    /// Summarise a clinic snapshot as of `now`
    pub fn new(now: DateTime<Utc>, role: UserRole, snapshot: &ClinicSnapshot) -> Self {
        debug!(%now, %role, "PromptContext::new: called");
        let patient_name = |id: &str| {
            snapshot
                .patient(id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let patients = snapshot
            .patients
            .iter()
            .map(|p| PatientLine {
                id: p.id.clone(),
                name: p.name.clone(),
                contact: p.phone.clone().or_else(|| p.email.clone()),
            })
            .collect();

        let appointments = snapshot
            .upcoming(now)
            .into_iter()
            .take(MAX_APPOINTMENTS)
            .map(|a| AppointmentLine {
                id: a.id.clone(),
                patient: patient_name(&a.patient_id),
                label: a.label(),
                status: a.status.to_string(),
            })
            .collect();

        let invoices = snapshot
            .open_invoices()
            .into_iter()
            .map(|i| InvoiceLine {
                id: i.id.clone(),
                patient: patient_name(&i.patient_id),
                amount: format_cents(i.amount_cents),
                description: i.description.clone(),
            })
            .collect();

        Self {
            today: now.format("%A %Y-%m-%d").to_string(),
            now: now.format("%H:%M").to_string(),
            role: role.to_string().replace('_', " "),
            current_page: None,
            patients,
            appointments,
            invoices,
            recent_commands: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn with_page(mut self, page: Option<String>) -> Self {
        self.current_page = page;
        self
    }

    pub fn with_recent_commands(mut self, commands: &[String]) -> Self {
        self.recent_commands = commands.to_vec();
        self
    }

    pub fn with_transcript(mut self, messages: &[ConversationMessage]) -> Self {
        self.transcript = messages
            .iter()
            .map(|m| TranscriptLine {
                role: match m.role {
                    MessageRole::User => "User".to_string(),
                    MessageRole::Assistant => "Assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();
        self
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Override directory (e.g. `.autopilot/prompts/`)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Use `{dir}/{name}.pmt` when present, else the embedded template
    pub fn new(override_dir: impl AsRef<Path>) -> Self {
        let dir = override_dir.as_ref();
        let exists = dir.exists();
        debug!(?dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            override_dir: exists.then(|| dir.to_path_buf()),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle names like O'Brien
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_prompt_context_summarises_snapshot() {
        let snapshot = ClinicSnapshot::demo(now());
        let ctx = PromptContext::new(now(), UserRole::FrontDesk, &snapshot);

        assert_eq!(ctx.today, "Monday 2026-10-19");
        assert_eq!(ctx.role, "front desk");
        assert_eq!(ctx.patients.len(), 4);
        assert_eq!(ctx.appointments.len(), 4);
        assert_eq!(ctx.invoices[0].amount, "$120.00");
    }

    #[test]
    fn test_render_planner_prompt() {
        let snapshot = ClinicSnapshot::demo(now());
        let ctx = PromptContext::new(now(), UserRole::Biller, &snapshot)
            .with_page(Some("calendar".into()))
            .with_recent_commands(&["remind Emily".to_string()]);

        let rendered = PromptLoader::embedded_only().render("planner", &ctx).unwrap();
        assert!(rendered.contains("Monday 2026-10-19"));
        assert!(rendered.contains("Sarah Johnson"));
        assert!(rendered.contains("calendar page"));
        assert!(rendered.contains("- remind Emily"));
        assert!(rendered.contains("Dr. Patel"));
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let mut snapshot = ClinicSnapshot::demo(now());
        snapshot.patients[0].name = "Sarah O'Brien".to_string();
        let ctx = PromptContext::new(now(), UserRole::FrontDesk, &snapshot);
        let rendered = PromptLoader::embedded_only().render("ask", &ctx).unwrap();
        assert!(rendered.contains("Sarah O'Brien"));
    }

    #[test]
    fn test_override_dir_wins() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("ask.pmt"), "Custom for {{role}}").unwrap();
        let ctx = PromptContext::new(now(), UserRole::Admin, &ClinicSnapshot::default());

        let rendered = PromptLoader::new(temp.path()).render("ask", &ctx).unwrap();
        assert_eq!(rendered, "Custom for admin");

        // Templates missing from the override dir fall back to embedded
        let planner = PromptLoader::new(temp.path()).render("planner", &ctx).unwrap();
        assert!(planner.contains("propose_plan"));
    }

    #[test]
    fn test_unknown_template() {
        let ctx = PromptContext::new(now(), UserRole::Admin, &ClinicSnapshot::default());
        assert!(PromptLoader::embedded_only().render("nonexistent", &ctx).is_err());
    }
}
