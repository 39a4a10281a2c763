use serde::Serialize;
use serde_json::Value;

use log::error;

use crate::topic::{TopicKind, Topics};

/// An event delivered by a [`BusSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A session has been established.
    Connected,
    /// A session has been lost, together with its disconnect code.
    Disconnected(i32),
    /// A configuration payload has been received.
    Config(Value),
    /// A command payload has been received.
    Command(Value),
}

/// A message bus session.
///
/// Implementors own the wire-level client: they connect, reconnect,
/// subscribe and parse inbound payloads, tagging each of them with its
/// message class.
pub trait BusSession {
    /// Takes the next pending event, if any.
    ///
    /// This call must not block.
    fn poll(&mut self) -> Option<BusEvent>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Returns the session [`Topics`].
    fn topics(&self) -> &Topics;

    /// Publishes a raw payload on a topic.
    ///
    /// Returns whether the transport has accepted the message.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool;

    /// Serializes a value as `JSON` and publishes it on the topic of the
    /// given [`TopicKind`].
    fn publish_json<T: Serialize + ?Sized>(&mut self, kind: TopicKind, value: &T, retain: bool) -> bool
    where
        Self: Sized,
    {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Impossible to serialize the {kind} payload: {e}");
                return false;
            }
        };
        let topic = self.topics().topic(kind);
        self.publish(&topic, &payload, retain)
    }
}

/// Reason of a session loss.
///
/// Codes follow the numbering common to embedded `MQTT` clients: negative
/// values come from the transport, positive ones from the broker
/// connection acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The broker did not answer in time.
    ConnectionTimeout,
    /// The connection has been dropped.
    ConnectionLost,
    /// The connection could not be opened.
    ConnectFailed,
    /// The client has disconnected.
    Disconnected,
    /// The broker does not support the requested protocol version.
    BadProtocol,
    /// The broker rejected the client identifier.
    BadClientId,
    /// The broker is unavailable.
    Unavailable,
    /// The broker rejected the credentials.
    BadCredentials,
    /// The client is not authorized.
    Unauthorized,
}

impl DisconnectReason {
    /// All disconnect reasons, ordered by code.
    pub const ALL: [Self; 9] = [
        Self::ConnectionTimeout,
        Self::ConnectionLost,
        Self::ConnectFailed,
        Self::Disconnected,
        Self::BadProtocol,
        Self::BadClientId,
        Self::Unavailable,
        Self::BadCredentials,
        Self::Unauthorized,
    ];

    /// Returns the disconnect code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ConnectionTimeout => -4,
            Self::ConnectionLost => -3,
            Self::ConnectFailed => -2,
            Self::Disconnected => -1,
            Self::BadProtocol => 1,
            Self::BadClientId => 2,
            Self::Unavailable => 3,
            Self::BadCredentials => 4,
            Self::Unauthorized => 5,
        }
    }

    /// Classifies a disconnect code.
    ///
    /// Returns [`None`] for an unrecognized code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -4 => Self::ConnectionTimeout,
            -3 => Self::ConnectionLost,
            -2 => Self::ConnectFailed,
            -1 => Self::Disconnected,
            1 => Self::BadProtocol,
            2 => Self::BadClientId,
            3 => Self::Unavailable,
            4 => Self::BadCredentials,
            5 => Self::Unauthorized,
            _ => return None,
        })
    }

    /// Returns the log line describing the reason.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "mqtt connection timeout",
            Self::ConnectionLost => "mqtt connection lost",
            Self::ConnectFailed => "mqtt connect failed",
            Self::Disconnected => "mqtt disconnected",
            Self::BadProtocol => "mqtt bad protocol",
            Self::BadClientId => "mqtt bad client id",
            Self::Unavailable => "mqtt unavailable",
            Self::BadCredentials => "mqtt bad credentials",
            Self::Unauthorized => "mqtt unauthorised",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tests::MockBus;
    use crate::topic::TopicKind;

    use super::{BusSession, DisconnectReason};

    #[test]
    fn disconnect_codes() {
        for reason in DisconnectReason::ALL {
            assert_eq!(DisconnectReason::from_code(reason.code()), Some(reason));
        }

        assert_eq!(
            DisconnectReason::from_code(-3).map(DisconnectReason::description),
            Some("mqtt connection lost")
        );
        assert_eq!(
            DisconnectReason::Unauthorized.to_string(),
            "mqtt unauthorised"
        );
    }

    #[test]
    fn distinct_descriptions() {
        let mut descriptions = DisconnectReason::ALL.map(DisconnectReason::description);
        assert!(descriptions.iter().all(|description| description.starts_with("mqtt ")));

        descriptions.sort_unstable();
        let len = descriptions.len();
        let mut unique = descriptions.to_vec();
        unique.dedup();
        assert_eq!(len, 9);
        assert_eq!(unique.len(), len);
    }

    #[test]
    fn unrecognized_codes() {
        for code in [-5, 0, 6, i32::MIN, i32::MAX] {
            assert_eq!(DisconnectReason::from_code(code), None);
        }
    }

    #[test]
    fn publish_json() {
        let mut bus = MockBus::new("aa0bcc");

        assert!(bus.publish_json(TopicKind::Status, &json!({ "relay": true }), false));

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "stat/aa0bcc");
        assert_eq!(published[0].1, br#"{"relay":true}"#);
        assert!(!published[0].2);
    }
}
