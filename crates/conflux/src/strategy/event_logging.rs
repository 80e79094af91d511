//! Structured trace lines for source events
//!
//! Each observed event becomes a [`LogLine`] written to a [`LogSink`]. By
//! default the events are derived from the capabilities each source
//! advertises, narrowed by the log level in effect:
//!
//! | Level | Watched |
//! |-------|---------|
//! | `info` | `transform` and every capability's before/after/fail triad |
//! | `warnings`, `errors` | the `*Fail` events |
//! | `none` | nothing |

use super::{Registrations, Strategy, StrategyBase};
use crate::coordinator::Coordinator;
use crate::source::{EventKind, Interface, Source, SourceEvent};
use async_trait::async_trait;
use conflux_core::{ActivationOptions, Event, LogLevel, Result, StrategyConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One observed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub prefix: String,
    pub source: String,
    pub event: EventKind,
    pub args: Vec<Value>,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.prefix, self.source, self.event)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Destination for event lines
pub trait LogSink: Send + Sync {
    fn write(&self, line: &LogLine);
}

/// Writes each line as a `tracing` event under the `conflux::events` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, line: &LogLine) {
        let args = Value::Array(line.args.clone());
        info!(
            target: "conflux::events",
            prefix = %line.prefix,
            source = %line.source,
            event = %line.event,
            args = %args,
            "source event"
        );
    }
}

/// Keeps lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write(&self, line: &LogLine) {
        self.lines.lock().push(line.clone());
    }
}

/// Builder for [`EventLoggingStrategy`]
#[derive(Default)]
pub struct EventLoggingStrategyBuilder {
    config: StrategyConfig,
    events: Option<Vec<EventKind>>,
    interfaces: Option<Vec<Interface>>,
    sink: Option<Arc<dyn LogSink>>,
}

impl EventLoggingStrategyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch exactly these events on every source, whatever the level
    pub fn events(mut self, events: impl IntoIterator<Item = EventKind>) -> Self {
        self.events = Some(events.into_iter().collect());
        self
    }

    /// Interfaces to watch instead of those derived from capabilities
    pub fn interfaces(mut self, interfaces: impl IntoIterator<Item = Interface>) -> Self {
        self.interfaces = Some(interfaces.into_iter().collect());
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_sources(sources);
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_prefix = Some(prefix.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = Some(level);
        self
    }

    pub fn build(self) -> EventLoggingStrategy {
        let name = self
            .config
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| EventLoggingStrategy::DEFAULT_NAME.to_string());
        let mut config = self.config;
        if config.log_prefix.is_none() {
            config.log_prefix = Some(EventLoggingStrategy::DEFAULT_PREFIX.to_string());
        }

        EventLoggingStrategy {
            base: StrategyBase::named(name, config),
            events: self.events,
            interfaces: self.interfaces,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            registrations: Registrations::default(),
        }
    }
}

/// Logs the events of the coordinated sources
pub struct EventLoggingStrategy {
    base: StrategyBase,
    events: Option<Vec<EventKind>>,
    interfaces: Option<Vec<Interface>>,
    sink: Arc<dyn LogSink>,
    registrations: Registrations,
}

impl EventLoggingStrategy {
    pub const DEFAULT_NAME: &'static str = "event-logging";
    pub const DEFAULT_PREFIX: &'static str = "[source-event]";

    /// Logs through `tracing` with the derived event set
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventLoggingStrategyBuilder {
        EventLoggingStrategyBuilder::new()
    }

    /// Events this strategy watches on `source` at the level in effect
    pub fn events_for(&self, source: &Source) -> Vec<EventKind> {
        if let Some(events) = &self.events {
            return events.clone();
        }
        let level = self.base.log_level().unwrap_or_default();
        let interfaces = match &self.interfaces {
            Some(interfaces) => interfaces.clone(),
            None => Interface::for_capabilities(&source.capabilities()),
        };
        interfaces
            .iter()
            .flat_map(|interface| interface.events(level))
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.len()
    }

    fn wire(&self, sources: &[Arc<Source>]) {
        for source in sources {
            for kind in self.events_for(source) {
                let sink = self.sink.clone();
                let prefix = self.base.log_prefix().to_string();
                let name = source.name().to_string();
                let handle = source.on(kind, move |event: &SourceEvent| {
                    sink.write(&LogLine {
                        prefix: prefix.clone(),
                        source: name.clone(),
                        event: event.kind(),
                        args: event.args(),
                    });
                    None
                });
                self.registrations.add(source, handle);
            }
        }
    }
}

impl Default for EventLoggingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for EventLoggingStrategy {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()> {
        let sources = self.base.begin_activation(coordinator, options)?;
        self.wire(&sources);
        self.base.end_activation(Ok(()))?;
        debug!(
            strategy = %self.name(),
            listeners = self.listener_count(),
            "{} activated",
            self.base.log_prefix()
        );
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        if !self.base.begin_deactivation() {
            return Ok(());
        }
        self.registrations.remove_all();
        self.base.end_deactivation();
        Ok(())
    }
}

impl fmt::Debug for EventLoggingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoggingStrategy")
            .field("base", &self.base)
            .field("events", &self.events)
            .field("interfaces", &self.interfaces)
            .field("registrations", &self.registrations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceBackend;
    use conflux_core::{Capabilities, Capability, Transform};

    struct PushOnly;

    #[async_trait]
    impl SourceBackend for PushOnly {
        fn capabilities(&self) -> Capabilities {
            Capabilities::none().with(Capability::Push)
        }

        async fn push(&self, transform: &Transform) -> Result<Vec<Transform>> {
            Ok(vec![transform.clone()])
        }
    }

    #[test]
    fn test_defaults() {
        let strategy = EventLoggingStrategy::new();
        assert_eq!(strategy.name(), "event-logging");
        assert_eq!(strategy.base().log_prefix(), "[source-event]");
    }

    #[test]
    fn test_events_follow_capabilities_and_level() {
        let source = Source::new("remote", Arc::new(PushOnly));

        let info = EventLoggingStrategy::builder()
            .log_level(LogLevel::Info)
            .build();
        assert_eq!(
            info.events_for(&source),
            vec![
                EventKind::Transform,
                EventKind::BeforePush,
                EventKind::Push,
                EventKind::PushFail
            ]
        );

        let errors = EventLoggingStrategy::builder()
            .log_level(LogLevel::Errors)
            .build();
        assert_eq!(errors.events_for(&source), vec![EventKind::PushFail]);

        let silent = EventLoggingStrategy::builder()
            .log_level(LogLevel::None)
            .build();
        assert!(silent.events_for(&source).is_empty());
    }

    #[test]
    fn test_explicit_events_ignore_level() {
        let source = Source::memory("memory");
        let strategy = EventLoggingStrategy::builder()
            .events([EventKind::Sync])
            .log_level(LogLevel::None)
            .build();
        assert_eq!(strategy.events_for(&source), vec![EventKind::Sync]);
    }

    #[test]
    fn test_configured_interfaces() {
        let source = Source::memory("memory");
        let strategy = EventLoggingStrategy::builder()
            .interfaces([Interface::Queryable])
            .log_level(LogLevel::Warnings)
            .build();
        assert_eq!(strategy.events_for(&source), vec![EventKind::QueryFail]);
    }

    #[tokio::test]
    async fn test_lines_written_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::new();
        let memory = Source::memory("memory");
        coordinator.add_source(memory.clone()).unwrap();

        let strategy = EventLoggingStrategy::builder()
            .events([EventKind::BeforePush, EventKind::Push])
            .sink(sink.clone())
            .build();
        strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap();
        assert_eq!(strategy.listener_count(), 2);

        memory.push(Transform::new("t1", vec![])).await.unwrap();
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event, EventKind::BeforePush);
        assert_eq!(lines[0].source, "memory");
        assert_eq!(lines[0].prefix, "[source-event]");
        assert_eq!(lines[1].args[0]["id"], "t1");

        strategy.deactivate().await.unwrap();
        sink.clear();
        memory.push(Transform::new("t2", vec![])).await.unwrap();
        assert!(sink.lines().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_records_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let line = LogLine {
            prefix: "[audit]".to_string(),
            source: "memory".to_string(),
            event: EventKind::Push,
            args: vec![serde_json::json!({"id": "t1"})],
        };
        tracing::subscriber::with_default(subscriber, || TracingSink.write(&line));

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("conflux::events"));
        assert!(output.contains("source=memory"));
        assert!(output.contains("event=push"));
        assert!(output.contains(r#"args=[{"id":"t1"}]"#));
    }
}
