//! `rackhub-os` provides the collaborators a `rackhub` device needs to run on
//! an operating system.
//!
//! The `rackhub` crate coordinates a device through a small set of traits,
//! without ever touching a network stack. This crate implements each of them
//! on top of the host environment:
//!
//! - [`link::HostLink`] reports the status of a host network interface,
//!   either wired or wireless
//! - [`resources::HostResources`] reads memory and storage counters
//! - [`mqtt::MqttBus`] keeps an `MQTT` session alive on a background thread
//!   and delivers configuration and command payloads
//! - [`server::ApiServer`] serves the adoption document over `REST`, and
//!   optionally advertises it through an `mDNS-SD` discovery service
//!
//! The device poll loop stays synchronous, while the server runs on an
//! asynchronous runtime and only reads through a cloned
//! [`rackhub::adoption::AdoptionComposer`].
//!
//! An `std` environment is required.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// The discovery service used to make the device detectable on the network.
pub mod discovery;
/// Error management.
pub mod error;
/// Host network interfaces.
pub mod link;
/// `MQTT` bus session.
pub mod mqtt;
/// Host resource counters.
pub mod resources;
/// The adoption server.
pub mod server;
