//! # Lobby Client Library
//!
//! Client-side half of the lobby. The client never decides anything: it keeps
//! a read-only mirror of the server's state and sends requests that the server
//! may apply or silently drop.
//!
//! ## Architecture Overview
//!
//! ### Mirroring
//! After connecting, the server sends a full snapshot of the lobby followed by
//! a stream of field updates. The mirror applies both in arrival order, and
//! each applied change fires the `on_change` callbacks registered on the
//! mirrored field.
//!
//! ### Requests
//! Toggling ready, cycling a cosmetic and asking to start are built as
//! commands from the current mirror contents. Nothing local changes until the
//! server's update comes back.
//!
//! ## Module Organization
//!
//! ### Mirror Module (`mirror`)
//! - Local identity and host identity from the welcome snapshot
//! - Participant roster kept in step with join/leave events
//! - Session counters (players ready, game starting)
//!
//! ### Commands Module (`commands`)
//! - Request stubs for the three participant commands
//! - Wrapping cosmetic selection against the catalog
//!
//! ### Console Module (`console`)
//! - Typed command parsing
//! - Status rendering
//! - A view that prints mirrored changes and detaches its observers on drop
//!
//! ### Network Module (`network`)
//! - TCP connection and framed packet exchange
//! - Reader task feeding the client loop
//! - Graceful disconnect
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::network::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect("127.0.0.1:8080").await?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod console;
pub mod mirror;
pub mod network;
