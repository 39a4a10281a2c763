use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use mdns_sd::{IfKind, ServiceDaemon, ServiceInfo};

use tracing::{info, warn};

use crate::error::Result;

// Default service domain searched by management planes.
const DOMAIN: &str = "rackhub";

// Default top-level domain.
const TOP_LEVEL_DOMAIN: &str = "local";

/// An `mDNS-SD` announcement of the adoption endpoint.
///
/// The endpoint is always served over `TCP`, so the service type is
/// `_<domain>._tcp.<top-level domain>.`.
#[derive(Debug)]
pub struct ServiceConfig<'a> {
    instance_name: &'a str,
    hostname: &'a str,
    domain: &'a str,
    top_level_domain: &'a str,
    // TXT record.
    properties: HashMap<String, String>,
    ipv6: bool,
}

impl<'a> ServiceConfig<'a> {
    /// Creates a [`ServiceConfig`] for the given instance name.
    ///
    /// The hostname defaults to the instance name.
    #[must_use]
    pub fn mdns_sd(instance_name: &'a str) -> Self {
        Self {
            instance_name,
            hostname: instance_name,
            domain: DOMAIN,
            top_level_domain: TOP_LEVEL_DOMAIN,
            properties: HashMap::new(),
            ipv6: true,
        }
    }

    /// Sets the service hostname.
    #[must_use]
    pub const fn hostname(mut self, hostname: &'a str) -> Self {
        self.hostname = hostname;
        self
    }

    /// Sets the service domain.
    #[must_use]
    pub const fn domain(mut self, domain: &'a str) -> Self {
        self.domain = domain;
        self
    }

    /// Sets the top-level domain, `local` by default.
    #[must_use]
    pub const fn top_level_domain(mut self, top_level_domain: &'a str) -> Self {
        self.top_level_domain = top_level_domain;
        self
    }

    /// Adds a TXT property, replacing any previous value for the same key.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Announces the service on `IPv4` interfaces only.
    #[must_use]
    pub const fn disable_ipv6(mut self) -> Self {
        self.ipv6 = false;
        self
    }

    fn service_type(&self) -> String {
        format!("_{}._tcp.{}.", self.domain, self.top_level_domain)
    }

    fn host(&self) -> String {
        format!("{}.{}.", self.hostname, self.top_level_domain)
    }
}

// Registers the service, returning the daemon announcing it.
pub(crate) fn register(
    config: &ServiceConfig,
    address: Ipv4Addr,
    port: u16,
) -> Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new()?;

    if !config.ipv6 {
        daemon.disable_interface(IfKind::IPv6)?;
    }

    let service_type = config.service_type();
    let host = config.host();

    // An unspecified address lets the daemon announce every interface
    // address.
    let service = if address.is_unspecified() {
        ServiceInfo::new(
            &service_type,
            config.instance_name,
            &host,
            "",
            port,
            config.properties.clone(),
        )?
        .enable_addr_auto()
    } else {
        ServiceInfo::new(
            &service_type,
            config.instance_name,
            &host,
            IpAddr::V4(address),
            port,
            config.properties.clone(),
        )?
    };

    daemon.register(service)?;

    info!("Service `{service_type}` registered as `{host}`");

    Ok(daemon)
}

// Stops announcing.
pub(crate) fn unregister(daemon: &ServiceDaemon) {
    if let Err(e) = daemon.shutdown() {
        warn!("Impossible to stop the discovery service: {e}");
    }
}
