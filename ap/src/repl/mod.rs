//! Interactive command bar and output rendering

pub mod render;
mod session;

pub use session::ReplSession;
