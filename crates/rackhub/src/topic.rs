/// A topic kind.
///
/// Each kind identifies a message class exchanged with the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Inbound configuration.
    Config,
    /// Inbound commands.
    Command,
    /// Outbound status.
    Status,
    /// Outbound telemetry.
    Telemetry,
    /// Outbound log lines.
    Log,
    /// Outbound adoption document.
    Adopt,
}

impl TopicKind {
    /// Returns the topic segment of a [`TopicKind`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Config => "conf",
            Self::Command => "cmnd",
            Self::Status => "stat",
            Self::Telemetry => "tele",
            Self::Log => "log",
            Self::Adopt => "adopt",
        }
    }
}

impl std::fmt::Display for TopicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

// Last-will topic segment, appended to the status topic.
const LWT_SEGMENT: &str = "lwt";

// Wildcard segment matching any topic kind.
const WILDCARD_SEGMENT: &str = "+";

/// Device topics.
///
/// Every topic follows the `[prefix/]<kind>/<client-id>[/suffix]` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    client_id: String,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl Topics {
    /// Creates [`Topics`] for the given client identifier.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            prefix: None,
            suffix: None,
        }
    }

    /// Sets a topic prefix.
    ///
    /// An empty prefix is ignored.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Sets a topic suffix.
    ///
    /// An empty suffix is ignored.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = non_empty(suffix.into());
        self
    }

    /// Returns the client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the topic of the given [`TopicKind`].
    #[must_use]
    pub fn topic(&self, kind: TopicKind) -> String {
        self.build(kind.name())
    }

    /// Returns the last-will topic.
    #[must_use]
    pub fn lwt(&self) -> String {
        let mut topic = self.topic(TopicKind::Status);
        topic.push('/');
        topic.push_str(LWT_SEGMENT);
        topic
    }

    /// Returns the topic matching every [`TopicKind`] of the device.
    #[must_use]
    pub fn wildcard(&self) -> String {
        self.build(WILDCARD_SEGMENT)
    }

    fn build(&self, segment: &str) -> String {
        let mut topic = String::new();
        if let Some(prefix) = &self.prefix {
            topic.push_str(prefix);
            topic.push('/');
        }
        topic.push_str(segment);
        topic.push('/');
        topic.push_str(&self.client_id);
        if let Some(suffix) = &self.suffix {
            topic.push('/');
            topic.push_str(suffix);
        }
        topic
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
