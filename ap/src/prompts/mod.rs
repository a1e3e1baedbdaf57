//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the LLM planner and
//! reasoner. Templates use Handlebars syntax.
//!
//! Template loading chain:
//! 1. `{override-dir}/{name}.pmt`
//! 2. Embedded fallback in code

pub mod embedded;
mod loader;

pub use loader::{AppointmentLine, InvoiceLine, PatientLine, PromptContext, PromptLoader, TranscriptLine};
