use std::future::Future;
use std::net::Ipv4Addr;

use rackhub::adoption::{AdoptionComposer, AdoptionDocument};

use axum::extract::{Json, State};
use axum::{Router, response::Redirect, routing::get};

use tracing::info;

use crate::error::Result;
use crate::discovery::{self, ServiceConfig};

// Default HTTP address.
//
// The entire local network is considered, so the Ipv4 unspecified address is
// used.
const DEFAULT_HTTP_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

// Default port.
pub(crate) const DEFAULT_SERVER_PORT: u16 = 80;

// Default scheme is `http`.
const DEFAULT_SCHEME: &str = "http";

// Route serving the adoption document.
const ADOPT_ROUTE: &str = "/adopt";

// Default service name needed to compose a well-known URI.
// https://en.wikipedia.org/wiki/Well-known_URI
const DEFAULT_WELL_KNOWN_SERVICE: &str = "rackhub";

// Composes a fresh adoption document at every request.
pub(crate) async fn adopt(State(composer): State<AdoptionComposer>) -> Json<AdoptionDocument> {
    Json(composer.compose())
}

#[derive(Debug)]
struct ServerData<'a> {
    // HTTP address.
    http_address: Ipv4Addr,
    // Server port.
    port: u16,
    // Scheme.
    scheme: &'a str,
    // Well-known service.
    well_known_service: &'a str,
    // Service configurator.
    service_config: Option<ServiceConfig<'a>>,
    // Adoption document composer.
    composer: AdoptionComposer,
}

/// A server exposing the adoption document of a device.
///
/// It only reads through the [`AdoptionComposer`], so it can run on its own
/// runtime while the device is polled elsewhere.
#[derive(Debug)]
pub struct ApiServer<'a> {
    data: ServerData<'a>,
}

impl<'a> ApiServer<'a> {
    /// Creates an [`ApiServer`] from the given [`AdoptionComposer`].
    #[must_use]
    pub const fn new(composer: AdoptionComposer) -> Self {
        Self {
            data: ServerData {
                http_address: DEFAULT_HTTP_ADDRESS,
                port: DEFAULT_SERVER_PORT,
                scheme: DEFAULT_SCHEME,
                well_known_service: DEFAULT_WELL_KNOWN_SERVICE,
                service_config: None,
                composer,
            },
        }
    }

    /// Sets the server `IPv4` address.
    #[must_use]
    pub const fn address(mut self, http_address: Ipv4Addr) -> Self {
        self.data.http_address = http_address;
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.data.port = port;
        self
    }

    /// Sets the server scheme. i.e. `http`
    #[must_use]
    pub const fn scheme(mut self, scheme: &'a str) -> Self {
        self.data.scheme = scheme;
        self
    }

    /// Sets the service name used to compose the well-known `URI`.
    #[must_use]
    pub const fn well_known_service(mut self, service_name: &'a str) -> Self {
        self.data.well_known_service = service_name;
        self
    }

    /// Sets the configuration for the discovery service.
    #[must_use]
    #[inline]
    pub fn discovery_service(mut self, service_config: ServiceConfig<'a>) -> Self {
        self.data.service_config = Some(service_config);
        self
    }

    /// Transforms the server into a [`GracefulShutdownServer`].
    ///
    /// The [`Future`] passed as input manages the graceful shutdown of
    /// the server.
    #[must_use]
    #[inline]
    pub fn with_graceful_shutdown<F>(self, signal: F) -> GracefulShutdownServer<'a, F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        GracefulShutdownServer {
            data: self.data,
            signal,
        }
    }

    /// Runs the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn run(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .run()
            .await
    }
}

/// A server with graceful shutdown.
///
/// Aside from the graceful shutdown functionality, it behaves the same as
/// [`ApiServer`].
#[derive(Debug)]
pub struct GracefulShutdownServer<'a, F> {
    // Server data.
    data: ServerData<'a>,
    // Graceful shutdown signal.
    signal: F,
}

impl<F> GracefulShutdownServer<'_, F>
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Runs the server with graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start or the discovery
    /// service cannot be registered.
    pub async fn run(self) -> Result<()> {
        let listener_bind = format!("{}:{}", self.data.http_address, self.data.port);

        // Construct well-known URI.
        let well_known_uri = format!("/.well-known/{}", self.data.well_known_service);

        info!("Server route: [GET, \"{ADOPT_ROUTE}\"]");
        info!("Server route: [GET, \"{well_known_uri}\"]");

        // Run a discovery service if present.
        let daemon = match self.data.service_config {
            Some(service_config) => {
                let service_config = service_config
                    .property("scheme", self.data.scheme)
                    .property("path", ADOPT_ROUTE);

                Some(discovery::register(
                    &service_config,
                    self.data.http_address,
                    self.data.port,
                )?)
            }
            None => None,
        };

        // Redirect the well-known URI to the adoption route.
        let router = Router::new()
            .route(ADOPT_ROUTE, get(adopt))
            .route(
                &well_known_uri,
                get(move || async { Redirect::to(ADOPT_ROUTE) }),
            )
            .with_state(self.data.composer);

        info!("Device reachable at this HTTP address: {listener_bind}");

        let listener = tokio::net::TcpListener::bind(listener_bind).await?;

        info!("Starting server...");

        axum::serve(listener, router)
            .with_graceful_shutdown(self.signal)
            .await?;

        if let Some(daemon) = daemon {
            discovery::unregister(&daemon);
        }

        Ok(())
    }
}
