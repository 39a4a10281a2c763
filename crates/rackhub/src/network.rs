use std::fmt::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::error::Result;

/// The medium a link is established over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Wired link.
    Ethernet,
    /// Wireless link.
    Wifi,
}

impl LinkMode {
    /// Returns the [`LinkMode`] name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
        }
    }
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

/// A hardware `MAC` address.
///
/// Displayed and serialized as six colon-separated upper-case hex pairs,
/// i.e. `02:11:22:AA:BB:CC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates a [`MacAddress`] from its octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the address octets.
    #[must_use]
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }

    /// Whether all octets are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == [0; 6]
    }

    /// Returns the default bus client identifier for this address.
    ///
    /// It is made of the last three octets as lower-case hex pairs.
    #[must_use]
    pub fn client_id(self) -> String {
        self.0[3..].iter().fold(String::with_capacity(6), |mut id, octet| {
            let _ = write!(id, "{octet:02x}");
            id
        })
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A link provider.
///
/// It hides the medium used to reach the network. Exactly one provider is
/// selected when the device is built, so the rest of the crate never
/// branches on the transport kind.
pub trait LinkProvider: Send + Sync {
    /// Returns the link medium.
    fn mode(&self) -> LinkMode;

    /// Whether the link is up, that is an address is currently held.
    ///
    /// It must reflect the link as it is now. [`LinkProvider::maintain`] is
    /// never called while the link is down, so a provider cannot rely on it
    /// to notice a recovery.
    fn is_up(&self) -> bool;

    /// Returns the current address, if any.
    fn address(&self) -> Option<Ipv4Addr>;

    /// Returns the hardware identifier, if available.
    fn mac(&self) -> Option<MacAddress>;

    /// Brings the link up.
    ///
    /// This call blocks until an address is obtained or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error when the hardware is missing, the link is down,
    /// or no address has been obtained in time.
    fn acquire(&self, timeout: Duration) -> Result<Ipv4Addr>;

    /// Maintains the link, i.e. renews an address lease.
    ///
    /// It is called on every poll while the link is up.
    fn maintain(&self) {}
}
