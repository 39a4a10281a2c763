use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use log::{Level, info, warn};

use crate::adoption::{AdoptionComposer, AdoptionDocument, FirmwareInfo, NoResources, SystemResources};
use crate::bus::{BusEvent, BusSession};
use crate::network::LinkProvider;
use crate::router::{CallbackRouter, CommandHandler, ConfigHandler, FeatureModule, Restart};
use crate::schema::SchemaSources;
use crate::session::{LogSink, SessionLifecycle};
use crate::state::ConnectionState;
use crate::topic::TopicKind;

// Default link acquisition timeout.
const LINK_TIMEOUT: Duration = Duration::from_secs(15);

// Address text shown while no address is available.
const NO_ADDRESS_TEXT: &str = "---.---.---.---";

// Topic text shown while no session is established.
const NO_TOPIC_TEXT: &str = "-/------";

// Maximum number of characters of a topic text.
const TOPIC_TEXT_LENGTH: usize = 39;

/// A device builder.
///
/// Schemas, handlers and feature modules can only be set here: once
/// [`DeviceBuilder::begin`] runs they are frozen.
pub struct DeviceBuilder<B: BusSession> {
    firmware: FirmwareInfo,
    link: Arc<dyn LinkProvider>,
    bus: B,
    resources: Arc<dyn SystemResources>,
    link_timeout: Duration,
    config: SchemaSources,
    command: SchemaSources,
    router: CallbackRouter,
}

impl<B: BusSession> DeviceBuilder<B> {
    /// Creates a [`DeviceBuilder`].
    #[must_use]
    pub fn new(firmware: FirmwareInfo, link: impl LinkProvider + 'static, bus: B) -> Self {
        Self {
            firmware,
            link: Arc::new(link),
            bus,
            resources: Arc::new(NoResources),
            link_timeout: LINK_TIMEOUT,
            config: SchemaSources::new(),
            command: SchemaSources::new(),
            router: CallbackRouter::new(),
        }
    }

    /// Sets the system resources reader.
    #[must_use]
    pub fn resources(mut self, resources: impl SystemResources + 'static) -> Self {
        self.resources = Arc::new(resources);
        self
    }

    /// Sets the restart trigger.
    #[must_use]
    pub fn restart(mut self, restart: impl Restart + 'static) -> Self {
        self.router.set_restart(restart);
        self
    }

    /// Sets the link acquisition timeout.
    #[must_use]
    pub const fn link_timeout(mut self, link_timeout: Duration) -> Self {
        self.link_timeout = link_timeout;
        self
    }

    /// Merges a fragment into the firmware configuration schema.
    #[must_use]
    pub fn config_schema(mut self, fragment: &Value) -> Self {
        self.config.firmware(fragment);
        self
    }

    /// Merges a fragment into the firmware command schema.
    #[must_use]
    pub fn command_schema(mut self, fragment: &Value) -> Self {
        self.command.firmware(fragment);
        self
    }

    /// Registers a feature module.
    ///
    /// A module named as an already registered one is discarded.
    #[must_use]
    pub fn module(mut self, module: impl FeatureModule + 'static) -> Self {
        self.router.register(Box::new(module));
        self
    }

    /// Sets the firmware configuration handler.
    #[must_use]
    pub fn on_config(mut self, handler: impl ConfigHandler + 'static) -> Self {
        self.router.set_config_handler(handler);
        self
    }

    /// Sets the firmware command handler.
    #[must_use]
    pub fn on_command(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.router.set_command_handler(handler);
        self
    }

    /// Starts the device.
    ///
    /// It blocks until the link is acquired or the link timeout elapses.
    /// A failed acquisition is logged and the device runs degraded.
    pub fn begin(mut self) -> Device<B> {
        match serde_json::to_string(&self.firmware) {
            Ok(firmware) => info!("Starting {firmware}"),
            Err(_) => info!("Starting {}", self.firmware.name()),
        }

        match self.link.mac() {
            Some(mac) => info!("MAC address: {mac}"),
            None => warn!("Unable to retrieve the MAC address"),
        }

        match self.link.acquire(self.link_timeout) {
            Ok(address) => info!("{} address: {address}", self.link.mode()),
            Err(e) => warn!("No {} link: {e}", self.link.mode()),
        }

        for module in self.router.modules() {
            if let Some(fragment) = module.config_schema() {
                self.config.module(fragment);
            }
            if let Some(fragment) = module.command_schema() {
                self.command.module(fragment);
            }
        }

        let composer = AdoptionComposer::new(
            self.firmware,
            self.config,
            self.command,
            Arc::clone(&self.link),
            self.resources,
        );

        Device {
            link: self.link,
            bus: self.bus,
            router: self.router,
            lifecycle: SessionLifecycle::new(),
            composer,
        }
    }
}

/// A device.
///
/// It owns every component and is driven by calling [`Device::poll`]
/// repeatedly from a single thread.
pub struct Device<B: BusSession> {
    link: Arc<dyn LinkProvider>,
    bus: B,
    router: CallbackRouter,
    lifecycle: SessionLifecycle,
    composer: AdoptionComposer,
}

impl<B: BusSession> Device<B> {
    /// Performs a unit of work.
    ///
    /// While the link is down nothing happens. Otherwise, the link is
    /// maintained and at most one bus event is handled.
    pub fn poll(&mut self) {
        if !self.link.is_up() {
            return;
        }

        self.link.maintain();

        match self.bus.poll() {
            Some(BusEvent::Connected) => self.lifecycle.on_connect(&mut self.bus, &self.composer),
            Some(BusEvent::Disconnected(code)) => {
                self.lifecycle.on_disconnect(&mut self.bus, code);
            }
            Some(BusEvent::Config(payload)) => self.router.route_config(&payload),
            Some(BusEvent::Command(payload)) => self.router.route_command(&payload),
            None => {}
        }
    }

    /// Returns the current [`ConnectionState`].
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_status(self.link.is_up(), self.bus.is_connected())
    }

    /// Publishes a status payload.
    ///
    /// Returns `false` when no link is present.
    pub fn publish_status(&mut self, payload: &Value) -> bool {
        self.publish(TopicKind::Status, payload)
    }

    /// Publishes a telemetry payload.
    ///
    /// Returns `false` when no link is present.
    pub fn publish_telemetry(&mut self, payload: &Value) -> bool {
        self.publish(TopicKind::Telemetry, payload)
    }

    /// Composes a fresh adoption document.
    #[must_use]
    pub fn adoption(&self) -> AdoptionDocument {
        self.composer.compose()
    }

    /// Returns the adoption composer.
    ///
    /// It can be cloned and moved to the threads serving adoption requests.
    #[must_use]
    pub const fn composer(&self) -> &AdoptionComposer {
        &self.composer
    }

    /// Returns the address as text, each octet padded to three digits.
    #[must_use]
    pub fn ip_address_text(&self) -> String {
        match self.link.address() {
            Some(address) if self.link.is_up() && address.octets()[0] != 0 => {
                let [a, b, c, d] = address.octets();
                format!("{a:03}.{b:03}.{c:03}.{d:03}")
            }
            _ => NO_ADDRESS_TEXT.into(),
        }
    }

    /// Returns the hardware identifier as text.
    #[must_use]
    pub fn mac_address_text(&self) -> String {
        self.link.mac().unwrap_or_default().to_string()
    }

    /// Returns the session wildcard topic as text.
    #[must_use]
    pub fn topic_text(&self) -> String {
        if self.connection_state().has_session() {
            self.bus
                .topics()
                .wildcard()
                .chars()
                .take(TOPIC_TEXT_LENGTH)
                .collect()
        } else {
            NO_TOPIC_TEXT.into()
        }
    }

    /// Writes a line through the log sink.
    pub fn log(&mut self, line: &str) {
        self.lifecycle.log().line(&mut self.bus, Level::Info, line);
    }

    /// Returns the log sink.
    #[must_use]
    pub const fn log_sink(&self) -> &LogSink {
        self.lifecycle.log()
    }

    /// Returns the bus session.
    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Returns the bus session mutably.
    pub const fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn publish(&mut self, kind: TopicKind, payload: &Value) -> bool {
        if !self.connection_state().has_link() {
            return false;
        }
        self.bus.publish_json(kind, payload, false)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::bus::BusEvent;
    use crate::error::ErrorKind;
    use crate::network::MacAddress;
    use crate::state::ConnectionState;
    use crate::tests::{FixedResources, MockBus, MockLink, Recorder, RecordingModule, RecordingRestart, firmware};

    use super::{Device, DeviceBuilder};

    fn device(link: &MockLink, bus: MockBus, recorder: &Recorder) -> Device<MockBus> {
        let config = recorder.clone();
        let command = recorder.clone();

        DeviceBuilder::new(firmware(), link.clone(), bus)
            .resources(FixedResources)
            .restart(RecordingRestart::new(recorder.clone()))
            .link_timeout(Duration::from_millis(10))
            .config_schema(&json!({ "pollMs": { "type": "integer" } }))
            .config_schema(&json!({ "name": { "type": "string" } }))
            .command_schema(&json!({ "relay": { "type": "integer" } }))
            .module(
                RecordingModule::new("sensor", recorder.clone())
                    .with_config_schema(json!({ "offset": { "type": "number" } }))
                    .with_command_schema(json!({ "restart": { "type": "string" } })),
            )
            .on_config(move |payload: &Value| config.record(format!("firmware config {payload}")))
            .on_command(move |payload: &Value| command.record(format!("firmware command {payload}")))
            .begin()
    }

    fn adopt_messages(device: &Device<MockBus>) -> usize {
        device
            .bus()
            .published()
            .iter()
            .filter(|(topic, _, retain)| topic == "adopt/aa0bcc" && *retain)
            .count()
    }

    #[test]
    fn link_down() {
        let link = MockLink::new();
        link.fail_acquire(ErrorKind::LinkDown);
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);

        device.poll();
        device.poll();

        // Nothing touches the bus while the link is down.
        assert_eq!(device.bus().polls(), 0);
        assert_eq!(link.maintained(), 0);
        assert_eq!(device.connection_state(), ConnectionState::None);

        assert!(!device.publish_status(&json!({ "relay": 1 })));
        assert!(!device.publish_telemetry(&json!({ "temperature": 21.5 })));
        assert_eq!(device.bus().publish_calls(), 0);
    }

    #[test]
    fn link_recovers_after_outage() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Config(json!({ "pollMs": 100 })));
        let mut device = device(&link, bus, &recorder);
        assert_eq!(device.connection_state(), ConnectionState::Link);

        link.set_up(false);
        for _ in 0..10 {
            device.poll();
        }
        assert_eq!(device.connection_state(), ConnectionState::None);
        assert_eq!(device.bus().polls(), 0);

        link.set_up(true);
        assert_eq!(device.connection_state(), ConnectionState::Link);

        device.poll();
        assert_eq!(device.bus().polls(), 1);
        assert_eq!(recorder.lines()[0], r#"firmware config {"pollMs":100}"#);
        assert!(device.publish_status(&json!({ "relay": 1 })));
    }

    #[test]
    fn connect_publishes_adoption_once() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);

        assert_eq!(device.connection_state(), ConnectionState::Link);

        device.poll();

        assert_eq!(device.connection_state(), ConnectionState::Session);
        assert_eq!(link.maintained(), 1);
        assert_eq!(adopt_messages(&device), 1);
        assert_eq!(device.log_sink().topic(), Some("log/aa0bcc"));

        // No further events, no further documents.
        device.poll();
        assert_eq!(adopt_messages(&device), 1);
    }

    #[test]
    fn reconnect_publishes_adoption_again() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Connected);
        bus.push(BusEvent::Disconnected(-3));
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);

        device.poll();
        device.poll();
        assert_eq!(device.connection_state(), ConnectionState::Link);

        device.poll();
        assert_eq!(device.connection_state(), ConnectionState::Session);
        assert_eq!(adopt_messages(&device), 2);
    }

    #[test]
    fn one_event_per_poll() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Config(json!({ "pollMs": 100 })));
        bus.push(BusEvent::Command(json!({ "relay": 1 })));
        let mut device = device(&link, bus, &recorder);

        device.poll();
        assert_eq!(
            recorder.lines(),
            [
                r#"firmware config {"pollMs":100}"#,
                r#"sensor config {"pollMs":100}"#,
            ]
        );
        assert_eq!(device.bus().pending(), 1);

        device.poll();
        assert_eq!(recorder.lines().len(), 4);
        assert_eq!(device.bus().pending(), 0);
    }

    #[test]
    fn restart_command() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Command(json!({ "restart": true })));
        let mut device = device(&link, bus, &recorder);

        device.poll();

        assert_eq!(
            recorder.lines(),
            [
                r#"firmware command {"restart":true}"#,
                r#"sensor command {"restart":true}"#,
                "restart",
            ]
        );
    }

    #[test]
    fn frozen_schemas() {
        let link = MockLink::new();
        let recorder = Recorder::default();
        let device = device(&link, MockBus::new("aa0bcc"), &recorder);

        let document = device.adoption();
        let config: Vec<&str> = document
            .config_schema
            .properties()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(config, ["pollMs", "name", "offset"]);
        assert_eq!(
            document.command_schema.properties()["restart"],
            json!({ "type": "boolean", "description": "Restart the controller" })
        );
        assert_eq!(
            document.command_schema.properties()["relay"],
            json!({ "type": "integer" })
        );
    }

    #[test]
    fn duplicate_module_schema_is_discarded() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let device = DeviceBuilder::new(firmware(), link, MockBus::new("aa0bcc"))
            .module(
                RecordingModule::new("sensor", recorder.clone())
                    .with_config_schema(json!({ "offset": { "type": "number" } })),
            )
            .module(
                RecordingModule::new("sensor", recorder)
                    .with_config_schema(json!({ "gain": { "type": "number" } })),
            )
            .begin();

        let document = device.adoption();
        assert!(document.config_schema.properties().contains_key("offset"));
        assert!(!document.config_schema.properties().contains_key("gain"));
    }

    #[test]
    fn publish_helpers() {
        let link = MockLink::new();
        let recorder = Recorder::default();
        let mut device = device(&link, MockBus::new("aa0bcc"), &recorder);

        // With a link, the transport decides.
        assert_eq!(device.connection_state(), ConnectionState::Link);
        assert!(device.publish_status(&json!({ "relay": 1 })));
        assert_eq!(
            device.bus().published().last(),
            Some(&("stat/aa0bcc".into(), br#"{"relay":1}"#.to_vec(), false))
        );

        device.bus_mut().reject_publishes(true);
        assert!(!device.publish_telemetry(&json!({ "temperature": 21.5 })));
        assert_eq!(device.bus().publish_calls(), 2);
    }

    #[test]
    fn text_helpers() {
        let link = MockLink::new();
        link.set_mac(Some(MacAddress::new([0x02, 0x11, 0x22, 0xAA, 0x0B, 0xCC])));
        link.fail_acquire(ErrorKind::AddressTimeout);
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);

        assert_eq!(device.ip_address_text(), "---.---.---.---");
        assert_eq!(device.mac_address_text(), "02:11:22:AA:0B:CC");
        assert_eq!(device.topic_text(), "-/------");

        link.set_up(true);
        link.set_address(Some(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(device.ip_address_text(), "---.---.---.---");

        link.set_address(Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(device.ip_address_text(), "192.168.001.020");

        device.poll();
        assert_eq!(device.topic_text(), "+/aa0bcc");
    }

    #[test]
    fn long_topic_text() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc").prefix("building-seven/floor-three/rack-twelve");
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);
        device.poll();

        let text = device.topic_text();
        assert_eq!(text.chars().count(), 39);
        assert!(text.starts_with("building-seven/floor-three/rack-twelve/"));
    }

    #[test]
    fn log_lines() {
        let link = MockLink::new();
        let recorder = Recorder::default();

        let mut bus = MockBus::new("aa0bcc");
        bus.push(BusEvent::Connected);
        let mut device = device(&link, bus, &recorder);

        device.log("before session");
        assert_eq!(device.bus().published().len(), 0);

        device.poll();
        device.log("relay 1 on");

        assert_eq!(
            device.bus().published().last(),
            Some(&("log/aa0bcc".into(), b"relay 1 on".to_vec(), false))
        );
    }
}
