//! `rackhub` is the connectivity and configuration core of a networked device.
//!
//! It takes a device from "powered on" to "discoverable and controllable over
//! a message bus and a `REST` endpoint", and keeps it there across transient
//! network loss.
//!
//! The crate does not talk to any hardware or network stack directly.
//! Instead, it coordinates a small set of collaborators, each one described
//! by a trait:
//!
//! - a [`network::LinkProvider`], reporting link status, address and
//!   hardware identifier
//! - a [`bus::BusSession`], delivering configuration and command payloads and
//!   publishing documents on the message bus
//! - an [`adoption::SystemResources`] reader, providing resource counters
//! - a [`router::Restart`] trigger, terminating the process on request
//!
//! On top of these, the crate provides:
//!
//! - a schema merger that composes fragments contributed by the firmware and
//!   by independent feature modules into a single document
//! - an adoption composer that builds the self-description document a
//!   management plane uses to discover the device capabilities
//! - a connection state derived from link and session status
//! - a router that interleaves the reserved `restart` command with firmware
//!   and feature-module commands
//! - a session lifecycle controller reacting to bus connections and
//!   disconnections
//!
//! Everything is owned by a single [`device::Device`] context, which is driven
//! by calling [`device::Device::poll`] repeatedly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Adoption document and its composer.
pub mod adoption;
/// Message bus contract and disconnect classification.
pub mod bus;
/// The device context owning every component.
pub mod device;
/// Error management.
pub mod error;
/// Link provider contract and hardware identifiers.
pub mod network;
/// Inbound message routing.
pub mod router;
/// Schema documents and their merge semantics.
pub mod schema;
/// Bus session lifecycle.
pub mod session;
/// Device connectivity state.
pub mod state;
/// Bus topic taxonomy.
pub mod topic;

#[cfg(test)]
mod tests;
