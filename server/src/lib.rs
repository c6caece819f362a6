//! # Lobby Server Library
//!
//! This library provides the authoritative side of the multiplayer lobby. It
//! owns the canonical lobby state, validates every participant request, and
//! replicates each accepted change to all connected observers.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server holds the only writable copy of every participant's readiness
//! flag and cosmetic selections. Clients never mutate shared state locally;
//! they send commands and wait for the resulting updates.
//!
//! ### Participant Management
//! Handles the lifecycle of lobby participants:
//! - Identity assignment on connection
//! - Capacity enforcement
//! - Removal and observer cleanup on disconnect
//!
//! ### Replication
//! Every accepted change is queued on one ordered stream and broadcast after
//! each processed event, so all observers see changes in the order the
//! authority made them.
//!
//! ## Architecture Design
//!
//! ### Single Authority Loop
//! Connection tasks only read and write frames. Every packet is funneled
//! through one channel into [`network::Server::run`], which applies events one
//! at a time. Registry and field mutations therefore never race.
//!
//! ### Explicit Authority Context
//! [`authority::AuthorityContext`] carries the designated host and the
//! replication outbox. It is created once per session and passed to the
//! registry, router and gate when they are built.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Who is in the lobby: add, remove, lookup and snapshot iteration.
//!
//! ### Router Module (`router`)
//! Validates and applies toggle-ready, change-cosmetic and start requests.
//!
//! ### Gate Module (`gate`)
//! Derives whether the lobby may start and performs the one-way transition.
//!
//! ### Network Module (`network`)
//! TCP transport, the authority loop, and the scene handoff.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::LobbyConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(LobbyConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod config;
pub mod gate;
pub mod network;
pub mod registry;
pub mod router;
