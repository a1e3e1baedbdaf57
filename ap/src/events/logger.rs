//! Event Logger - persists events to JSONL files
//!
//! Subscribes to the EventBus and writes every event to
//! `{events-dir}/{stream-id}/events.jsonl` for history and replay.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{ApEvent, EventLogEntry};

/// Event logger that writes events to JSONL files
pub struct EventLogger {
    events_dir: PathBuf,
    /// Open file writers per stream
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(events_dir: impl AsRef<Path>) -> Self {
        let events_dir = events_dir.as_ref().to_path_buf();
        debug!(?events_dir, "EventLogger::new: creating logger");
        Self {
            events_dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its stream's log file
    pub fn write_event(&mut self, event: &ApEvent) -> eyre::Result<()> {
        let stream_id = event.stream_id();
        debug!(%stream_id, event_type = event.event_type(), "EventLogger::write_event");

        let writer = match self.writers.entry(stream_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let stream_dir = self.events_dir.join(stream_id);
                fs::create_dir_all(&stream_dir)?;
                let log_path = stream_dir.join("events.jsonl");
                debug!(?log_path, "EventLogger: opening log file");
                let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Close the writer for a stream
    pub fn close_stream(&mut self, stream_id: &str) {
        debug!(%stream_id, "EventLogger::close_stream");
        if let Some(mut writer) = self.writers.remove(stream_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from the bus until it closes
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        debug!("EventLogger::run: starting event logger");
        let mut rx = event_bus.subscribe();
        drop(event_bus);

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(stream_id = event.stream_id(), error = %e, "EventLogger: failed to write event");
                    }
                    if event.closes_stream() {
                        self.close_stream(event.stream_id());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (stream_id, mut writer) in self.writers.drain() {
            debug!(%stream_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a stream's log file
pub fn read_stream_events(events_dir: impl AsRef<Path>, stream_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = events_dir.as_ref().join(stream_id).join("events.jsonl");
    debug!(?log_path, "read_stream_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_stream_events: failed to parse line"),
        }
    }

    debug!(count = entries.len(), "read_stream_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
pub fn spawn_event_logger(
    event_bus: Arc<EventBus>,
    events_dir: impl AsRef<Path>,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    fs::create_dir_all(events_dir.as_ref())?;
    let logger = EventLogger::new(events_dir);
    Ok(tokio::spawn(async move {
        logger.run(event_bus).await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanStatus;
    use tempfile::tempdir;

    fn started(plan_id: &str) -> ApEvent {
        ApEvent::PlanStarted {
            plan_id: plan_id.to_string(),
            step_count: 1,
        }
    }

    #[test]
    fn test_write_event() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());

        logger.write_event(&started("plan-1")).unwrap();

        let log_path = temp.path().join("plan-1").join("events.jsonl");
        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("PlanStarted"));
        assert!(content.contains("plan-1"));
    }

    #[test]
    fn test_read_stream_events_in_order() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());

        logger.write_event(&started("plan-2")).unwrap();
        logger
            .write_event(&ApEvent::PlanFinished {
                plan_id: "plan-2".into(),
                status: PlanStatus::Success,
            })
            .unwrap();

        let entries = read_stream_events(temp.path(), "plan-2").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event.event_type(), "PlanStarted");
        assert_eq!(entries[1].event.event_type(), "PlanFinished");
    }

    #[test]
    fn test_read_nonexistent_stream() {
        let temp = tempdir().unwrap();
        assert!(read_stream_events(temp.path(), "nope").unwrap().is_empty());
    }

    #[test]
    fn test_close_stream() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        logger.write_event(&started("plan-3")).unwrap();
        assert!(logger.writers.contains_key("plan-3"));
        logger.close_stream("plan-3");
        assert!(!logger.writers.contains_key("plan-3"));
    }

    #[tokio::test]
    async fn test_run_until_bus_dropped() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(EventBus::new(16));
        let handle = spawn_event_logger(bus.clone(), temp.path()).unwrap();

        // Give the logger a moment to subscribe
        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.emitter_for("plan-4").plan_started(1);
        drop(bus);
        handle.await.unwrap();

        let entries = read_stream_events(temp.path(), "plan-4").unwrap();
        assert_eq!(entries.len(), 1);
    }
}
