use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::adoption::{AdoptionComposer, FirmwareInfo, SystemInfo, SystemResources};
use crate::bus::{BusEvent, BusSession};
use crate::error::{Error, ErrorKind, Result};
use crate::network::{LinkMode, LinkProvider, MacAddress};
use crate::router::{FeatureModule, Restart};
use crate::schema::SchemaSources;
use crate::topic::Topics;

// Address assigned by a successful acquisition.
const MOCK_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

pub(crate) fn firmware() -> FirmwareInfo {
    FirmwareInfo::new("Rack Relay Controller", "relay", "Rack Hub", "1.2.0")
        .github_url("https://github.com/rackhub/relay")
}

pub(crate) fn composer() -> AdoptionComposer {
    AdoptionComposer::new(
        firmware(),
        SchemaSources::new(),
        SchemaSources::new(),
        Arc::new(MockLink::new()),
        Arc::new(FixedResources),
    )
}

pub(crate) struct FixedResources;

impl SystemResources for FixedResources {
    fn snapshot(&self) -> SystemInfo {
        SystemInfo {
            flash_chip_size_bytes: 4_194_304,
            heap_free_bytes: 1024,
            heap_used_bytes: 2048,
            heap_max_alloc_bytes: 512,
            ..SystemInfo::default()
        }
    }
}

#[derive(Default)]
struct LinkStatus {
    up: bool,
    address: Option<Ipv4Addr>,
    mac: Option<MacAddress>,
    failure: Option<ErrorKind>,
    maintained: usize,
}

// Clones share the same status.
#[derive(Clone)]
pub(crate) struct MockLink {
    mode: LinkMode,
    status: Arc<Mutex<LinkStatus>>,
}

impl MockLink {
    pub(crate) fn new() -> Self {
        Self {
            mode: LinkMode::Ethernet,
            status: Arc::new(Mutex::new(LinkStatus::default())),
        }
    }

    pub(crate) fn with_mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub(crate) fn set_up(&self, up: bool) {
        self.status.lock().unwrap().up = up;
    }

    pub(crate) fn set_address(&self, address: Option<Ipv4Addr>) {
        self.status.lock().unwrap().address = address;
    }

    pub(crate) fn set_mac(&self, mac: Option<MacAddress>) {
        self.status.lock().unwrap().mac = mac;
    }

    pub(crate) fn fail_acquire(&self, kind: ErrorKind) {
        self.status.lock().unwrap().failure = Some(kind);
    }

    pub(crate) fn maintained(&self) -> usize {
        self.status.lock().unwrap().maintained
    }
}

impl LinkProvider for MockLink {
    fn mode(&self) -> LinkMode {
        self.mode
    }

    fn is_up(&self) -> bool {
        self.status.lock().unwrap().up
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.status.lock().unwrap().address
    }

    fn mac(&self) -> Option<MacAddress> {
        self.status.lock().unwrap().mac
    }

    fn acquire(&self, _timeout: Duration) -> Result<Ipv4Addr> {
        let mut status = self.status.lock().unwrap();
        if let Some(kind) = status.failure {
            return Err(Error::new(kind, "Mock link failure."));
        }
        status.up = true;
        Ok(*status.address.get_or_insert(MOCK_ADDRESS))
    }

    fn maintain(&self) {
        self.status.lock().unwrap().maintained += 1;
    }
}

pub(crate) struct MockBus {
    topics: Topics,
    events: VecDeque<BusEvent>,
    connected: bool,
    reject: bool,
    polls: usize,
    publish_calls: usize,
    published: Vec<(String, Vec<u8>, bool)>,
}

impl MockBus {
    pub(crate) fn new(client_id: &str) -> Self {
        Self {
            topics: Topics::new(client_id),
            events: VecDeque::new(),
            connected: false,
            reject: false,
            polls: 0,
            publish_calls: 0,
            published: Vec::new(),
        }
    }

    pub(crate) fn prefix(mut self, prefix: &str) -> Self {
        self.topics = self.topics.prefix(prefix);
        self
    }

    pub(crate) fn push(&mut self, event: BusEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn reject_publishes(&mut self, reject: bool) {
        self.reject = reject;
    }

    pub(crate) fn pending(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls
    }

    pub(crate) fn publish_calls(&self) -> usize {
        self.publish_calls
    }

    pub(crate) fn published(&self) -> &[(String, Vec<u8>, bool)] {
        &self.published
    }
}

impl BusSession for MockBus {
    fn poll(&mut self) -> Option<BusEvent> {
        self.polls += 1;
        let event = self.events.pop_front();
        match event {
            Some(BusEvent::Connected) => self.connected = true,
            Some(BusEvent::Disconnected(_)) => self.connected = false,
            _ => {}
        }
        event
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn topics(&self) -> &Topics {
        &self.topics
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        self.publish_calls += 1;
        if self.reject {
            return false;
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        true
    }
}

// Records the order in which handlers run.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub(crate) fn record(&self, line: impl Into<String>) {
        self.0.lock().unwrap().push(line.into());
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct RecordingModule {
    name: &'static str,
    recorder: Recorder,
    config_schema: Option<Value>,
    command_schema: Option<Value>,
}

impl RecordingModule {
    pub(crate) fn new(name: &'static str, recorder: Recorder) -> Self {
        Self {
            name,
            recorder,
            config_schema: None,
            command_schema: None,
        }
    }

    pub(crate) fn with_config_schema(mut self, fragment: Value) -> Self {
        self.config_schema = Some(fragment);
        self
    }

    pub(crate) fn with_command_schema(mut self, fragment: Value) -> Self {
        self.command_schema = Some(fragment);
        self
    }
}

impl FeatureModule for RecordingModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn config_schema(&self) -> Option<Value> {
        self.config_schema.clone()
    }

    fn command_schema(&self) -> Option<Value> {
        self.command_schema.clone()
    }

    fn on_config(&mut self, payload: &Value) {
        self.recorder.record(format!("{} config {payload}", self.name));
    }

    fn on_command(&mut self, payload: &Value) {
        self.recorder.record(format!("{} command {payload}", self.name));
    }
}

pub(crate) struct RecordingRestart(Recorder);

impl RecordingRestart {
    pub(crate) fn new(recorder: Recorder) -> Self {
        Self(recorder)
    }
}

impl Restart for RecordingRestart {
    fn restart(&mut self) {
        self.0.record("restart");
    }
}
