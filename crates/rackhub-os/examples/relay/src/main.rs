use std::time::{Duration, Instant};

use rackhub::adoption::FirmwareInfo;
use rackhub::device::DeviceBuilder;
use rackhub::network::LinkProvider;
use rackhub::router::FeatureModule;

use rackhub_os::error::Error;
use rackhub_os::link::HostLink;
use rackhub_os::mqtt::{MqttBus, MqttConfig};
use rackhub_os::resources::HostResources;
use rackhub_os::server::ApiServer;
use rackhub_os::discovery::ServiceConfig;

use clap::Parser;

use serde_json::{Value, json};

use tracing::{error, info};

// Number of relays driven by the controller.
const RELAYS: usize = 8;

// Interval between two telemetry messages.
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(30);

// Idle time between two polls.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Broker host.
    #[arg(long)]
    broker: String,

    /// Broker port.
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,

    /// Broker username.
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Broker password.
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Topic prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// Network interface.
    #[arg(long, default_value = "eth0")]
    interface: String,

    /// Whether the network interface is wireless.
    #[arg(long)]
    wifi: bool,

    /// Server port.
    #[arg(short = 'p', long, default_value_t = 80)]
    port: u16,

    /// Service hostname. It must match the machine hostname.
    #[arg(long, default_value = "relay")]
    hostname: String,
}

// Drives a bank of relays.
struct RelayBank {
    relays: [bool; RELAYS],
    pulse_ms: u64,
}

impl RelayBank {
    const fn new() -> Self {
        Self {
            relays: [false; RELAYS],
            pulse_ms: 500,
        }
    }

    fn set(&mut self, command: &Value) {
        let Some(index) = command["index"].as_u64().and_then(|index| usize::try_from(index).ok())
        else {
            error!("Relay command without a valid index: {command}");
            return;
        };

        let Some(relay) = self.relays.get_mut(index) else {
            error!("Relay {index} out of range");
            return;
        };

        match command["type"].as_str() {
            Some("on") => *relay = true,
            Some("off") => *relay = false,
            Some("toggle") => *relay = !*relay,
            Some("pulse") => {
                info!("Relay {index} pulsed for {} ms", self.pulse_ms);
                return;
            }
            _ => {
                error!("Unknown relay command: {command}");
                return;
            }
        }

        info!("Relay {index} is {}", if *relay { "on" } else { "off" });
    }
}

impl FeatureModule for RelayBank {
    fn name(&self) -> &'static str {
        "relays"
    }

    fn config_schema(&self) -> Option<Value> {
        Some(json!({
            "pulseMs": {
                "title": "Pulse Duration (ms)",
                "type": "integer",
                "minimum": 100,
            },
        }))
    }

    fn command_schema(&self) -> Option<Value> {
        Some(json!({
            "relays": {
                "title": "Relays",
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "minimum": 0, "maximum": RELAYS - 1 },
                        "type": { "type": "string", "enum": ["on", "off", "toggle", "pulse"] },
                    },
                    "required": ["index", "type"],
                },
            },
        }))
    }

    fn on_config(&mut self, payload: &Value) {
        if let Some(pulse_ms) = payload["pulseMs"].as_u64() {
            self.pulse_ms = pulse_ms;
            info!("Pulse duration set to {pulse_ms} ms");
        }
    }

    fn on_command(&mut self, payload: &Value) {
        if let Some(commands) = payload["relays"].as_array() {
            for command in commands {
                self.set(command);
            }
        }
    }
}

fn main() -> Result<(), Error> {
    // Both the `log` and the `tracing` records reach this subscriber.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    let link = if cli.wifi {
        HostLink::wifi(cli.interface)
    } else {
        HostLink::ethernet(cli.interface)
    };
    let mac = link.mac().unwrap_or_default();

    let mut config = MqttConfig::new(cli.broker).port(cli.broker_port);
    if let (Some(username), Some(password)) = (cli.username, cli.password) {
        config = config.credentials(username, password);
    }
    if let Some(prefix) = cli.prefix {
        config = config.topic_prefix(prefix);
    }
    let bus = MqttBus::new(&config, mac)?;

    let firmware = FirmwareInfo::new("Rack Relay Controller", "relay", "rackhub", "0.1.0")
        .github_url("https://github.com/rackhub/rackhub");

    let mut device = DeviceBuilder::new(firmware, link, bus)
        .resources(HostResources::new())
        .config_schema(&json!({
            "telemetry": { "title": "Publish Telemetry", "type": "boolean" },
        }))
        .module(RelayBank::new())
        .on_config(|payload: &Value| info!("Configuration received: {payload}"))
        .on_command(|payload: &Value| info!("Command received: {payload}"))
        .begin();

    let composer = device.composer().clone();
    let port = cli.port;
    let hostname = cli.hostname;
    std::thread::Builder::new()
        .name("rackhub-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Impossible to start the server runtime: {e}");
                    return;
                }
            };

            let server = ApiServer::new(composer)
                .port(port)
                .discovery_service(
                    ServiceConfig::mdns_sd("relay")
                        .hostname(&hostname)
                        .disable_ipv6(),
                );

            if let Err(e) = runtime.block_on(server.run()) {
                error!("Server stopped: {e}");
            }
        })?;

    let mut last_telemetry = Instant::now();
    loop {
        device.poll();

        if last_telemetry.elapsed() >= TELEMETRY_INTERVAL {
            last_telemetry = Instant::now();
            let telemetry = json!({
                "ip": device.ip_address_text(),
                "state": device.connection_state(),
            });
            if !device.publish_telemetry(&telemetry) {
                device.log("telemetry not published");
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
