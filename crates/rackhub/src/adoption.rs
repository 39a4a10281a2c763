use std::borrow::Cow;
use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::network::{LinkMode, LinkProvider, MacAddress};
use crate::router::RESTART_KEY;
use crate::schema::{SchemaDocument, SchemaSources};

/// Firmware identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareInfo {
    name: Cow<'static, str>,
    short_name: Cow<'static, str>,
    maker: Cow<'static, str>,
    version: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    github_url: Option<Cow<'static, str>>,
}

impl FirmwareInfo {
    /// Creates a [`FirmwareInfo`].
    #[must_use]
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        short_name: impl Into<Cow<'static, str>>,
        maker: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            maker: maker.into(),
            version: version.into(),
            github_url: None,
        }
    }

    /// Sets the source repository address.
    #[must_use]
    pub fn github_url(mut self, github_url: impl Into<Cow<'static, str>>) -> Self {
        self.github_url = Some(github_url.into());
        self
    }

    /// Returns the firmware name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the firmware short name.
    ///
    /// It is used as title for schema documents.
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Returns the firmware maker.
    #[must_use]
    pub fn maker(&self) -> &str {
        &self.maker
    }

    /// Returns the firmware version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// System resource counters, in bytes.
///
/// An unavailable counter is `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Total flash size.
    pub flash_chip_size_bytes: u64,
    /// Free heap.
    pub heap_free_bytes: u64,
    /// Used heap.
    pub heap_used_bytes: u64,
    /// Largest block that can be allocated.
    pub heap_max_alloc_bytes: u64,
    /// Space used by the running program.
    pub sketch_space_used_bytes: u64,
    /// Space available for the running program.
    pub sketch_space_total_bytes: u64,
    /// Used file system space.
    pub file_system_used_bytes: u64,
    /// Total file system space.
    pub file_system_total_bytes: u64,
}

/// A system resources reader.
pub trait SystemResources: Send + Sync {
    /// Returns a point-in-time snapshot of the resource counters.
    fn snapshot(&self) -> SystemInfo;
}

/// A [`SystemResources`] reader with nothing to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl SystemResources for NoResources {
    fn snapshot(&self) -> SystemInfo {
        SystemInfo::default()
    }
}

/// Network identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Link medium.
    pub mode: LinkMode,
    /// Current address, [`Ipv4Addr::UNSPECIFIED`] when unknown.
    pub ip: Ipv4Addr,
    /// Hardware identifier, all zeros when unknown.
    pub mac: MacAddress,
}

impl NetworkInfo {
    fn read(link: &dyn LinkProvider) -> Self {
        Self {
            mode: link.mode(),
            ip: link.address().unwrap_or(Ipv4Addr::UNSPECIFIED),
            mac: link.mac().unwrap_or_default(),
        }
    }
}

/// The self-description document of a device.
///
/// Sections are serialized in a fixed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionDocument {
    /// Firmware identity.
    pub firmware: FirmwareInfo,
    /// System resource counters.
    pub system: SystemInfo,
    /// Network identity.
    pub network: NetworkInfo,
    /// Configuration schema.
    pub config_schema: SchemaDocument,
    /// Command schema, always carrying the reserved `restart` entry.
    pub command_schema: SchemaDocument,
}

/// Composes [`AdoptionDocument`]s.
///
/// All schema fragments are frozen at construction, so the composer can be
/// cloned cheaply and shared with the threads serving adoption requests.
#[derive(Clone)]
pub struct AdoptionComposer {
    firmware: Arc<FirmwareInfo>,
    config: Arc<SchemaSources>,
    command: Arc<SchemaSources>,
    link: Arc<dyn LinkProvider>,
    resources: Arc<dyn SystemResources>,
}

impl std::fmt::Debug for AdoptionComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdoptionComposer")
            .field("firmware", &self.firmware)
            .field("config", &self.config)
            .field("command", &self.command)
            .field("mode", &self.link.mode())
            .finish_non_exhaustive()
    }
}

impl AdoptionComposer {
    /// Creates an [`AdoptionComposer`].
    #[must_use]
    pub fn new(
        firmware: FirmwareInfo,
        config: SchemaSources,
        command: SchemaSources,
        link: Arc<dyn LinkProvider>,
        resources: Arc<dyn SystemResources>,
    ) -> Self {
        Self {
            firmware: Arc::new(firmware),
            config: Arc::new(config),
            command: Arc::new(command),
            link,
            resources,
        }
    }

    /// Returns the firmware identity.
    #[must_use]
    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    /// Composes a fresh [`AdoptionDocument`].
    ///
    /// Collaborators are read at every call, nothing is cached.
    #[must_use]
    pub fn compose(&self) -> AdoptionDocument {
        let title = self.firmware.short_name();

        let mut command_schema = self.command.document(title);
        command_schema.insert(
            RESTART_KEY,
            json!({
                "type": "boolean",
                "description": "Restart the controller",
            }),
        );

        AdoptionDocument {
            firmware: FirmwareInfo::clone(&self.firmware),
            system: self.resources.snapshot(),
            network: NetworkInfo::read(self.link.as_ref()),
            config_schema: self.config.document(title),
            command_schema,
        }
    }
}
