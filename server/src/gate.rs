//! Start gating: when the lobby may turn into a game
//!
//! The gate is derived from the registry on demand and never cached. The
//! transition it guards is one-way: once the session is `Started` it stays
//! there. The terminal flag is itself a replicated field so every observer
//! learns about the transition through the normal update stream.

use crate::authority::AuthorityContext;
use crate::registry::SessionRegistry;
use log::info;
use shared::{ClientId, FieldId, LobbyError, ReplicatedField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Lobby,
    Started,
}

/// Collaborator that performs the actual move into gameplay
///
/// The gate only flips the terminal flag and then hands the roster over;
/// loading scenes or spawning the game belongs to the implementor.
pub trait GameHandoff {
    fn hand_off(&mut self, roster: &[ClientId]);
}

/// Decides when the lobby may start and records that it has
pub struct StartGate {
    /// Terminal flag, replicated as `GameStarting`
    started: ReplicatedField<bool>,
    /// Number of ready participants, replicated as `PlayersReady`
    players_ready: ReplicatedField<i32>,
}

impl StartGate {
    pub fn new(ctx: &AuthorityContext) -> Self {
        Self {
            started: ReplicatedField::authority(FieldId::GameStarting, false, ctx.outbox().clone()),
            players_ready: ReplicatedField::authority(
                FieldId::PlayersReady,
                0,
                ctx.outbox().clone(),
            ),
        }
    }

    /// Current phase, derived from the terminal flag
    pub fn phase(&self) -> SessionPhase {
        if self.started.get() {
            SessionPhase::Started
        } else {
            SessionPhase::Lobby
        }
    }

    /// True iff the lobby is non-empty and every participant is ready
    pub fn evaluate(&self, registry: &SessionRegistry) -> bool {
        let participants = registry.all();
        !participants.is_empty() && participants.iter().all(|p| p.is_ready())
    }

    /// Recomputes the replicated ready count; returns the new count
    pub fn refresh(&self, registry: &SessionRegistry) -> Result<i32, LobbyError> {
        let ready = registry.all().iter().filter(|p| p.is_ready()).count() as i32;
        self.players_ready.set(ready)?;
        Ok(ready)
    }

    /// Moves the session from `Lobby` to `Started`
    ///
    /// Fails with `SessionAlreadyStarted` after a previous success and with
    /// `NotAllReady` if the gate is closed; neither failure changes state.
    pub fn transition(
        &self,
        registry: &SessionRegistry,
        handoff: &mut dyn GameHandoff,
    ) -> Result<(), LobbyError> {
        if self.phase() == SessionPhase::Started {
            return Err(LobbyError::SessionAlreadyStarted);
        }
        if !self.evaluate(registry) {
            return Err(LobbyError::NotAllReady);
        }

        self.started.set(true)?;
        let roster = registry.ids();
        info!("Lobby started with {} participants", roster.len());
        handoff.hand_off(&roster);
        Ok(())
    }

    /// Last published ready count
    pub fn players_ready(&self) -> i32 {
        self.players_ready.get()
    }

    pub fn started_field(&self) -> &ReplicatedField<bool> {
        &self.started
    }

    pub fn players_ready_field(&self) -> &ReplicatedField<i32> {
        &self.players_ready
    }
}
