//! Registry events for external observers.
//!
//! The registry publishes an [`Event`] after every committed change. Events
//! go to the subscribers registered on its [`EventBus`]; [`EventSink`]
//! writes them as JSON lines to stdout or a file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::TaskId;

pub const EVENT_SCHEMA_VERSION: &str = "taskreg.event.v1";

#[derive(Debug, Clone)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskRemoved,
    TaskRemovedFromRecents,
    ActivityAdded,
    ActivityRemoved,
    TaskCleared,
    TaskReparented,
    TaskResized,
    MultiWindowModeChanged,
    PinnedStackChanged,
    AffiliationChanged,
    ChainRepaired,
    TaskDescriptionChanged,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    pub task: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event: EventKind, task: TaskId) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            task,
            data: None,
        }
    }

    /// Attach a payload that is already JSON.
    pub fn with_value(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// Receives events from the registry.
pub trait EventSubscriber: Send {
    fn on_event(&mut self, event: &Event);
}

/// Fan-out to registered subscribers, in registration order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn dispatch(&mut self, event: Event) {
        tracing::debug!(event = ?event.event, task = %event.task, "registry event");
        for subscriber in &mut self.subscribers {
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

impl EventSubscriber for EventSink {
    fn on_event(&mut self, event: &Event) {
        if let Err(err) = self.emit(event) {
            tracing::warn!(error = %err, "failed to write event");
        }
    }
}

/// Subscriber that keeps every event in memory. Clones share the log.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl EventSubscriber for EventLog {
    fn on_event(&mut self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_delivers_to_every_subscriber() {
        let first = EventLog::new();
        let second = EventLog::new();
        let mut bus = EventBus::new();
        bus.subscribe(Box::new(first.clone()));
        bus.subscribe(Box::new(second.clone()));

        bus.dispatch(Event::new(EventKind::TaskCreated, TaskId::new(7)));
        assert_eq!(first.kinds(), vec![EventKind::TaskCreated]);
        assert_eq!(second.events()[0].task, TaskId::new(7));
    }

    #[test]
    fn sink_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let mut sink = EventDestination::parse(Some(path.to_str().expect("utf8 path")))
            .expect("destination")
            .open()
            .expect("open sink");
        let event = Event::new(EventKind::TaskResized, TaskId::new(3))
            .with_value(serde_json::json!({ "bounds": "[0,0][10,10]" }));
        sink.emit(&event).expect("emit");
        sink.emit(&event).expect("emit");

        let written = std::fs::read_to_string(&path).expect("read events");
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(parsed["event"], "task_resized");
        assert_eq!(parsed["task"], 3);
        assert_eq!(parsed["schema_version"], EVENT_SCHEMA_VERSION);
    }

    #[test]
    fn blank_destination_is_none() {
        assert!(EventDestination::parse(Some("  ")).is_none());
        assert!(matches!(
            EventDestination::parse(Some("-")),
            Some(EventDestination::Stdout)
        ));
    }
}
