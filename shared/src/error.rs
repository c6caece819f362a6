//! Failure taxonomy for lobby commands and replication
//!
//! Every variant is recoverable and scoped to a single command: the authority
//! drops the command, leaves canonical state untouched and reports the error.
//! None of these ends the session.

use crate::cosmetic::CosmeticCategory;
use crate::protocol::ClientId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LobbyError {
    /// Command names an identity the registry does not (or no longer) hold
    #[error("participant {0} is not in the lobby")]
    UnknownParticipant(ClientId),

    /// Cosmetic index outside `[0, size)` for its category
    #[error("index {index} is out of range for {category} (catalog size {size})")]
    InvalidIndex {
        category: CosmeticCategory,
        index: i32,
        size: u32,
    },

    /// Caller lacks authority for the operation
    #[error("not authorized")]
    NotAuthorized,

    #[error("participant {0} is already registered")]
    DuplicateIdentity(ClientId),

    #[error("not all participants are ready")]
    NotAllReady,

    #[error("session has already started")]
    SessionAlreadyStarted,

    #[error("lobby is full ({max} participants)")]
    LobbyFull { max: usize },
}
