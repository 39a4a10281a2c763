use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rackhub::error::{Error, ErrorKind, Result};
use rackhub::network::{LinkMode, LinkProvider, MacAddress};

use sysinfo::Networks;

use tracing::{debug, info};

// Interval between two address checks while acquiring a link.
const ACQUIRE_INTERVAL: Duration = Duration::from_millis(250);

// Default minimum interval between two interface reads.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// Interface data observed on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interface {
    address: Option<Ipv4Addr>,
    mac: Option<MacAddress>,
}

// Last interface read and its instant.
#[derive(Debug, Default)]
struct Observation {
    interface: Option<Interface>,
    read_at: Option<Instant>,
}

impl Observation {
    // Returns the observed interface, reading it again through `read` once
    // `interval` has elapsed since the last read.
    fn observe(
        &mut self,
        now: Instant,
        interval: Duration,
        read: impl FnOnce() -> Option<Interface>,
    ) -> Option<Interface> {
        let stale = self
            .read_at
            .is_none_or(|read_at| now.saturating_duration_since(read_at) >= interval);
        if stale {
            self.update(now, read());
        }
        self.interface
    }

    fn update(&mut self, now: Instant, interface: Option<Interface>) {
        self.interface = interface;
        self.read_at = Some(now);
    }
}

/// A link provider backed by a host network interface.
///
/// The host operating system brings the interface up and leases its
/// address, so this provider only observes it. Every query reads the
/// interface again once the refresh interval has elapsed, so an outage and
/// the following recovery are both noticed.
#[derive(Debug)]
pub struct HostLink {
    mode: LinkMode,
    interface: Cow<'static, str>,
    refresh_interval: Duration,
    observation: Mutex<Observation>,
}

impl HostLink {
    /// Creates a wired [`HostLink`] for the given interface, i.e. `eth0`.
    #[must_use]
    pub fn ethernet(interface: impl Into<Cow<'static, str>>) -> Self {
        Self::new(LinkMode::Ethernet, interface.into())
    }

    /// Creates a wireless [`HostLink`] for the given interface, i.e. `wlan0`.
    #[must_use]
    pub fn wifi(interface: impl Into<Cow<'static, str>>) -> Self {
        Self::new(LinkMode::Wifi, interface.into())
    }

    /// Sets the minimum interval between two interface reads.
    #[must_use]
    pub const fn refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Returns the interface name.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn new(mode: LinkMode, interface: Cow<'static, str>) -> Self {
        Self {
            mode,
            interface,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            observation: Mutex::new(Observation::default()),
        }
    }

    fn read(&self) -> Option<Interface> {
        let networks = Networks::new_with_refreshed_list();
        let data = networks.list().get(self.interface.as_ref())?;

        let address = data.ip_networks().iter().find_map(|network| match network.addr {
            IpAddr::V4(address) if !address.is_unspecified() => Some(address),
            _ => None,
        });

        let mac = MacAddress::new(data.mac_address().0);

        Some(Interface {
            address,
            mac: (!mac.is_zero()).then_some(mac),
        })
    }

    // Reads the interface regardless of the refresh interval.
    fn refresh(&self) -> Option<Interface> {
        let interface = self.read();
        if let Ok(mut observation) = self.observation.lock() {
            observation.update(Instant::now(), interface);
        }
        interface
    }

    fn current(&self) -> Option<Interface> {
        match self.observation.lock() {
            Ok(mut observation) => {
                observation.observe(Instant::now(), self.refresh_interval, || self.read())
            }
            Err(_) => self.read(),
        }
    }
}

impl LinkProvider for HostLink {
    fn mode(&self) -> LinkMode {
        self.mode
    }

    fn is_up(&self) -> bool {
        self.address().is_some()
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.current().and_then(|interface| interface.address)
    }

    fn mac(&self) -> Option<MacAddress> {
        self.current().and_then(|interface| interface.mac)
    }

    fn acquire(&self, timeout: Duration) -> Result<Ipv4Addr> {
        let start = Instant::now();
        loop {
            let Some(interface) = self.refresh() else {
                return Err(Error::new(
                    ErrorKind::NoHardware,
                    format!("Interface `{}` not found.", self.interface),
                ));
            };

            if let Some(address) = interface.address {
                info!("Interface `{}` acquired", self.interface);
                return Ok(address);
            }

            if start.elapsed() >= timeout {
                return Err(Error::new(
                    ErrorKind::AddressTimeout,
                    format!(
                        "No address on `{}` after {} ms.",
                        self.interface,
                        timeout.as_millis()
                    ),
                ));
            }

            debug!("Waiting for an address on `{}`", self.interface);
            std::thread::sleep(ACQUIRE_INTERVAL);
        }
    }

    fn maintain(&self) {
        self.current();
    }
}
