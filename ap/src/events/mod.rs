//! Event bus, JSONL event logger and audit log
//!
//! Every significant step of dispatch and plan execution emits an [`ApEvent`]
//! on a `tokio::sync::broadcast` bus. Consumers (the REPL `/events` view, the
//! JSONL logger) subscribe independently. The [`AuditLog`] is separate: it is
//! the append-only record of clinic changes, carrying undo/redo descriptors.

mod audit;
mod bus;
mod logger;
mod types;

pub use audit::AuditLog;
pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use logger::{EventLogger, read_stream_events, spawn_event_logger};
pub use types::{ApEvent, EventLogEntry};
