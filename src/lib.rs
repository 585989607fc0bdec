//! linkbird - authenticated UDP link-quality measurement for point-to-point tunnels.
//!
//! This crate implements a lightweight heartbeat protocol for estimating round-trip
//! latency and packet loss across VPN links, and renders the collected statistics
//! into a configuration snippet for the bird routing daemon.
//!
//! # Usage
//!
//! Probe two tunnels and act as responder for the remote ends:
//! ```bash
//! linkbird --responder -i tun-site-a -i tun-site-b --psk-file /etc/linkbird.key
//! ```
//!
//! Run a single measurement cycle and print the results as JSON:
//! ```bash
//! linkbird -i tun-site-a --psk-file /etc/linkbird.key --oneshot
//! ```

/// Bird config rendering and daemon reload.
pub mod bird;
/// Command-line configuration and validation.
pub mod configuration;
/// Pre-shared key handling and packet authentication tags.
pub mod crypto;
/// Top-level measurement loop.
pub mod daemon;
/// Device-bound socket support.
pub mod netdev;
/// Wire codec for the heartbeat protocol.
pub mod packets;
/// Active prober driving measurement cycles.
pub mod prober;
/// Bounded per-peer ping record store.
pub mod records;
/// Interface-to-peer-address discovery.
pub mod resolver;
/// Passive responder recording pings and answering stat requests.
pub mod responder;
/// Per-cycle measurement results.
pub mod stats;
/// Millisecond wall-clock timestamps.
pub mod time;
