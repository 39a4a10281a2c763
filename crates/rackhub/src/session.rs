use log::{Level, error, info, log};

use crate::adoption::AdoptionComposer;
use crate::bus::{BusSession, DisconnectReason};
use crate::topic::TopicKind;

/// A log sink.
///
/// Every line is written to the process log. Once bound to a topic, lines
/// are mirrored onto the bus while a session is established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSink {
    topic: Option<String>,
}

impl LogSink {
    /// Creates an unbound [`LogSink`].
    #[must_use]
    pub const fn new() -> Self {
        Self { topic: None }
    }

    /// Binds the sink to a bus topic, replacing any previous one.
    pub fn bind(&mut self, topic: impl Into<String>) {
        self.topic = Some(topic.into());
    }

    /// Returns the bound topic, if any.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Writes a line.
    pub fn line<B: BusSession>(&self, bus: &mut B, level: Level, line: &str) {
        log!(level, "{line}");

        if let Some(topic) = self.topic.as_deref()
            && bus.is_connected()
        {
            bus.publish(topic, line.as_bytes(), false);
        }
    }
}

/// Reacts to the establishment and the loss of a bus session.
#[derive(Debug, Clone, Default)]
pub struct SessionLifecycle {
    sink: LogSink,
}

impl SessionLifecycle {
    /// Creates a [`SessionLifecycle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sink: LogSink::new(),
        }
    }

    /// Handles a session establishment.
    ///
    /// The log sink is bound to the session log topic, then a freshly
    /// composed adoption document is published as a retained message.
    /// A failed publish is logged and never retried.
    pub fn on_connect<B: BusSession>(&mut self, bus: &mut B, composer: &AdoptionComposer) {
        self.sink.bind(bus.topics().topic(TopicKind::Log));

        let document = composer.compose();
        if bus.publish_json(TopicKind::Adopt, &document, true) {
            info!("Adoption document published");
        } else {
            error!("Impossible to publish the adoption document");
        }

        self.sink.line(bus, Level::Info, "mqtt connected");
    }

    /// Handles a session loss.
    ///
    /// The disconnect code is classified and logged. An unrecognized code
    /// is ignored.
    pub fn on_disconnect<B: BusSession>(&self, bus: &mut B, code: i32) -> Option<DisconnectReason> {
        let reason = DisconnectReason::from_code(code)?;
        self.sink.line(bus, Level::Warn, reason.description());
        Some(reason)
    }

    /// Returns the log sink.
    #[must_use]
    pub const fn log(&self) -> &LogSink {
        &self.sink
    }
}
