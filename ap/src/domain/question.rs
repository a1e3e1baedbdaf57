//! Clarification question domain type

use serde::{Deserialize, Serialize};

use super::plan::PlanError;

/// Kind of answer a question expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TextInput,
    DatePicker,
}

impl QuestionType {
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleChoice => write!(f, "single_choice"),
            Self::MultipleChoice => write!(f, "multiple_choice"),
            Self::TextInput => write!(f, "text_input"),
            Self::DatePicker => write!(f, "date_picker"),
        }
    }
}

/// What a question is trying to resolve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionContext {
    /// Several patients matched the command
    PatientMatch { candidate_ids: Vec<String> },
    /// The patient has several upcoming appointments
    AppointmentMatch { candidate_ids: Vec<String> },
    /// No target date/time was given
    MissingTime {
        #[serde(default)]
        appointment_id: Option<String>,
    },
    /// Some other required field is missing
    MissingField { field: String },
    #[default]
    None,
}

/// A structured follow-up question blocking plan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub id: String,
    pub prompt: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub context: QuestionContext,
}

fn default_required() -> bool {
    true
}

impl ClarificationQuestion {
    /// Create a question, enforcing that choice types carry options
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        question_type: QuestionType,
        options: Vec<String>,
    ) -> Result<Self, PlanError> {
        let question = Self {
            id: id.into(),
            prompt: prompt.into(),
            question_type,
            options,
            required: true,
            context: QuestionContext::None,
        };
        question.validate()?;
        Ok(question)
    }

    pub fn single_choice(
        id: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, PlanError> {
        Self::new(id, prompt, QuestionType::SingleChoice, options)
    }

    pub fn multiple_choice(
        id: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, PlanError> {
        Self::new(id, prompt, QuestionType::MultipleChoice, options)
    }

    pub fn text_input(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            question_type: QuestionType::TextInput,
            options: Vec::new(),
            required: true,
            context: QuestionContext::None,
        }
    }

    pub fn date_picker(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            question_type: QuestionType::DatePicker,
            options: Vec::new(),
            required: true,
            context: QuestionContext::None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_context(mut self, context: QuestionContext) -> Self {
        self.context = context;
        self
    }

    /// Check the structural invariants of the question
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.id.trim().is_empty() {
            return Err(PlanError::InvalidQuestion {
                id: self.id.clone(),
                reason: "question id is empty".to_string(),
            });
        }
        if self.question_type.is_choice() && self.options.is_empty() {
            return Err(PlanError::InvalidQuestion {
                id: self.id.clone(),
                reason: format!("{} question has no options", self.question_type),
            });
        }
        Ok(())
    }
}
