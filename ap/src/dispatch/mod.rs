//! Command dispatch: the entry point for command-bar text

mod ambiguity;
mod dispatcher;
mod error;

pub use ambiguity::{AmbiguityDetector, KeywordDetector, NeverAmbiguous, is_question};
pub(crate) use ambiguity::{BLOCK_RE, SCHEDULING_RE};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig};
pub use error::DispatchError;
