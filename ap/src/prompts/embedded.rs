//! Embedded prompts
//!
//! Compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Planner system prompt
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Conversational reasoner system prompt
pub const REASONER: &str = include_str!("../../prompts/reasoner.pmt");

/// Question-answering system prompt
pub const ASK: &str = include_str!("../../prompts/ask.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "planner" => Some(PLANNER),
        "reasoner" => Some(REASONER),
        "ask" => Some(ASK),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded() {
        assert!(get_embedded("planner").unwrap().contains("propose_plan"));
        assert!(get_embedded("reasoner").unwrap().contains("reply"));
        assert!(get_embedded("ask").is_some());
        assert!(get_embedded("nope").is_none());
    }
}
