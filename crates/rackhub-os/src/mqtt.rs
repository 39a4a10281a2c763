use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rackhub::bus::{BusEvent, BusSession, DisconnectReason};
use rackhub::network::MacAddress;
use rackhub::topic::{TopicKind, Topics};

use flume::{Receiver, Sender, TrySendError};

use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, Incoming, LastWill, MqttOptions,
    QoS,
};

use serde::{Deserialize, Serialize};

use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorKind, Result};

// Default broker port.
const DEFAULT_PORT: u16 = 1883;

// Default keep-alive interval, in seconds.
const DEFAULT_KEEP_ALIVE: u64 = 60;

// Default delay between two reconnection attempts, in seconds.
const DEFAULT_RECONNECT_DELAY: u64 = 5;

// Capacity of the request channel shared with the connection.
const REQUEST_CAPACITY: usize = 32;

// Capacity of the notification channel read by the poll loop.
const NOTIFICATION_CAPACITY: usize = 32;

// Payload published on the last-will topic once connected.
const ONLINE_PAYLOAD: &str = r#"{"online":true}"#;

// Payload registered as last will.
const OFFLINE_PAYLOAD: &str = r#"{"online":false}"#;

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE
}

const fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY
}

/// `MQTT` session configuration.
///
/// It can be provisioned as `JSON`. The password is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing)]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic_suffix: Option<String>,
    #[serde(default = "default_keep_alive")]
    keep_alive_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_secs: u64,
}

impl MqttConfig {
    /// Creates a [`MqttConfig`] for the given broker host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            client_id: None,
            username: None,
            password: None,
            topic_prefix: None,
            topic_suffix: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Sets the broker port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the client identifier.
    ///
    /// When not set, it is derived from the hardware identifier.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the topic prefix.
    #[must_use]
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    /// Sets the topic suffix.
    #[must_use]
    pub fn topic_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.topic_suffix = Some(suffix.into());
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = keep_alive.as_secs();
        self
    }

    /// Sets the delay between two reconnection attempts.
    #[must_use]
    pub const fn reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay_secs = reconnect_delay.as_secs();
        self
    }

    /// Returns the device [`Topics`].
    #[must_use]
    pub fn topics(&self, mac: MacAddress) -> Topics {
        let client_id = self.client_id.clone().unwrap_or_else(|| mac.client_id());
        Topics::new(client_id)
            .prefix(self.topic_prefix.clone().unwrap_or_default())
            .suffix(self.topic_suffix.clone().unwrap_or_default())
    }

    fn options(&self, topics: &Topics) -> Result<MqttOptions> {
        if self.host.is_empty() {
            return Err(Error::new(ErrorKind::Bus, "Broker host missing."));
        }

        let mut options = MqttOptions::new(topics.client_id(), self.host.as_str(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_last_will(LastWill::new(
            topics.lwt(),
            OFFLINE_PAYLOAD,
            QoS::AtLeastOnce,
            true,
        ));
        if let Some(username) = &self.username {
            options.set_credentials(
                username.as_str(),
                self.password.as_deref().unwrap_or_default(),
            );
        }
        Ok(options)
    }
}

// Notifications forwarded by the connection thread.
#[derive(Debug, PartialEq)]
enum Notification {
    ConnAck,
    Publish { topic: String, payload: Vec<u8> },
    Disconnected(i32),
}

// Decodes inbound messages into bus events.
#[derive(Debug)]
struct Inbox {
    config: String,
    command: String,
}

impl Inbox {
    fn new(topics: &Topics) -> Self {
        Self {
            config: topics.topic(TopicKind::Config),
            command: topics.topic(TopicKind::Command),
        }
    }

    fn decode(&self, topic: &str, payload: &[u8]) -> Option<BusEvent> {
        let is_config = topic == self.config;
        if !is_config && topic != self.command {
            debug!("Ignore message on `{topic}`");
            return None;
        }

        match serde_json::from_slice(payload) {
            Ok(payload) if is_config => Some(BusEvent::Config(payload)),
            Ok(payload) => Some(BusEvent::Command(payload)),
            Err(e) => {
                warn!("Drop message on `{topic}`: invalid JSON payload ({e})");
                None
            }
        }
    }
}

// Maps a connection error to a disconnect code.
fn disconnect_code(error: &ConnectionError, was_connected: bool) -> i32 {
    let reason = match error {
        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion => DisconnectReason::BadProtocol,
            ConnectReturnCode::BadClientId => DisconnectReason::BadClientId,
            ConnectReturnCode::ServiceUnavailable => DisconnectReason::Unavailable,
            ConnectReturnCode::BadUserNamePassword => DisconnectReason::BadCredentials,
            ConnectReturnCode::NotAuthorized => DisconnectReason::Unauthorized,
            ConnectReturnCode::Success => DisconnectReason::Disconnected,
        },
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            DisconnectReason::ConnectionTimeout
        }
        ConnectionError::RequestsDone => DisconnectReason::Disconnected,
        _ if was_connected => DisconnectReason::ConnectionLost,
        _ => DisconnectReason::ConnectFailed,
    };
    reason.code()
}

// Turns connection events into notifications and owns the session flag.
//
// Consecutive failures with the same code are reported once, so an outage
// produces a single disconnection until the code changes or a session is
// established again.
#[derive(Debug)]
struct Tracker {
    session: Arc<AtomicBool>,
    last_failure: Option<i32>,
}

impl Tracker {
    fn new(session: Arc<AtomicBool>) -> Self {
        Self {
            session,
            last_failure: None,
        }
    }

    fn track(&mut self, event: std::result::Result<Event, ConnectionError>) -> Option<Notification> {
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                self.session.store(true, Ordering::Release);
                self.last_failure = None;
                Some(Notification::ConnAck)
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => Some(Notification::Publish {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Connection error: {e}");
                let was_connected = self.session.swap(false, Ordering::AcqRel);
                let code = disconnect_code(&e, was_connected);
                if self.last_failure == Some(code) {
                    return None;
                }
                self.last_failure = Some(code);
                Some(Notification::Disconnected(code))
            }
        }
    }
}

// Forwards a notification, returning `false` once the bus is dropped.
//
// Disconnections are dropped when the queue is full. The session flag still
// reports them.
fn forward(sender: &Sender<Notification>, notification: Notification) -> bool {
    match notification {
        Notification::Disconnected(code) => match sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Drop disconnection {code}, notification queue full");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        },
        notification => sender.send(notification).is_ok(),
    }
}

// Drives the connection, forwarding notifications until the bus is dropped.
fn drive(
    mut connection: Connection,
    sender: &Sender<Notification>,
    mut tracker: Tracker,
    reconnect_delay: Duration,
) {
    for event in connection.iter() {
        let failed = event.is_err();

        if let Some(notification) = tracker.track(event)
            && !forward(sender, notification)
        {
            break;
        }

        if failed {
            std::thread::sleep(reconnect_delay);
        }
    }
    debug!("Connection thread stopped");
}

/// A [`BusSession`] backed by an `MQTT` broker.
///
/// The connection runs on a background thread which reconnects on its own
/// and keeps the session status current, even while nobody polls.
/// Every [`BusSession::poll`] call takes at most one pending notification
/// without blocking.
pub struct MqttBus {
    client: Client,
    topics: Topics,
    inbox: Inbox,
    notifications: Receiver<Notification>,
    session: Arc<AtomicBool>,
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("topics", &self.topics)
            .field("inbox", &self.inbox)
            .field("notifications", &self.notifications)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl MqttBus {
    /// Creates a [`MqttBus`] and starts its connection thread.
    ///
    /// # Errors
    ///
    /// Returns an error when the broker host is missing or the connection
    /// thread cannot be spawned.
    pub fn new(config: &MqttConfig, mac: MacAddress) -> Result<Self> {
        let topics = config.topics(mac);
        let options = config.options(&topics)?;
        let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let (sender, notifications) = flume::bounded(NOTIFICATION_CAPACITY);
        let session = Arc::new(AtomicBool::new(false));
        let tracker = Tracker::new(Arc::clone(&session));

        std::thread::Builder::new()
            .name("rackhub-mqtt".into())
            .spawn(move || drive(connection, &sender, tracker, reconnect_delay))
            .map_err(|e| Error::new(ErrorKind::Bus, e.to_string()))?;

        info!(
            "Connecting to {}:{} as `{}`",
            config.host,
            config.port,
            topics.client_id()
        );

        Ok(Self {
            client,
            inbox: Inbox::new(&topics),
            topics,
            notifications,
            session,
        })
    }

    fn on_connected(&mut self) {
        for topic in [&self.inbox.config, &self.inbox.command] {
            if let Err(e) = self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                error!("Impossible to subscribe to `{topic}`: {e}");
            }
        }

        if let Err(e) = self
            .client
            .try_publish(self.topics.lwt(), QoS::AtLeastOnce, true, ONLINE_PAYLOAD)
        {
            error!("Impossible to announce the session: {e}");
        }
    }
}

impl BusSession for MqttBus {
    fn poll(&mut self) -> Option<BusEvent> {
        loop {
            match self.notifications.try_recv().ok()? {
                Notification::ConnAck => {
                    self.on_connected();
                    return Some(BusEvent::Connected);
                }
                Notification::Publish { topic, payload } => {
                    if let Some(event) = self.inbox.decode(&topic, &payload) {
                        return Some(event);
                    }
                }
                Notification::Disconnected(code) => return Some(BusEvent::Disconnected(code)),
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session.load(Ordering::Acquire)
    }

    fn topics(&self) -> &Topics {
        &self.topics
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        match self
            .client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Impossible to publish on `{topic}`: {e}");
                false
            }
        }
    }
}
