//! Wire protocol between the lobby authority and its observers
//!
//! Clients only ever send requests ([`Command`]); the authority answers with a
//! single ordered stream of [`Update`]s that every observer applies in the
//! order it was produced.

use crate::cosmetic::{Catalog, CosmeticCategory, CATEGORY_COUNT};
use crate::error::LobbyError;
use serde::{Deserialize, Serialize};

/// Transport-assigned participant identity
pub type ClientId = u32;

/// Bumped whenever the packet layout changes
pub const PROTOCOL_VERSION: u32 = 1;

/// Names a replicated field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldId {
    Ready(ClientId),
    Cosmetic(ClientId, CosmeticCategory),
    /// Session-wide count of ready participants
    PlayersReady,
    /// Session-wide terminal flag, true once the lobby has started
    GameStarting,
}

impl FieldId {
    /// The participant owning this field, or None for session-wide fields
    pub fn owner(&self) -> Option<ClientId> {
        match self {
            FieldId::Ready(id) | FieldId::Cosmetic(id, _) => Some(*id),
            FieldId::PlayersReady | FieldId::GameStarting => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: FieldId,
    pub value: FieldValue,
}

/// Session membership changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    ParticipantJoined(ClientId),
    ParticipantLeft(ClientId),
}

/// One entry in the authority's replication stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Update {
    Field(FieldUpdate),
    Session(SessionEvent),
}

/// Request from a participant to mutate canonical state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    ToggleReady,
    ChangeCosmetic {
        category: CosmeticCategory,
        index: i32,
    },
    RequestStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub id: ClientId,
    pub ready: bool,
    pub cosmetics: [i32; CATEGORY_COUNT],
}

/// Full lobby state handed to an observer when it joins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    /// Identity assigned to the receiving client
    pub client_id: ClientId,
    pub host_id: ClientId,
    pub catalog: Catalog,
    pub players_ready: i32,
    pub game_starting: bool,
    pub participants: Vec<ParticipantSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect { client_version: u32 },
    Command(Command),
    Disconnect,

    // Server -> client
    Welcome(LobbySnapshot),
    Replicate { updates: Vec<Update> },
    Rejected { command: Command, error: LobbyError },
    LoadScene { scene: String },
    Disconnected { reason: String },
}
