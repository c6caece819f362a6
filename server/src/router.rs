//! Authority-side command validation and application
//!
//! Participants never mutate lobby state themselves; they send a [`Command`]
//! and the router decides. Every rejection leaves canonical state exactly as
//! it was, so a dropped command is indistinguishable from one never sent.
//!
//! Checks run in a fixed order: session phase first, then the requester's
//! identity, then the payload. After the session starts every command fails
//! with `SessionAlreadyStarted` no matter who sent it.

use crate::authority::AuthorityContext;
use crate::gate::{GameHandoff, SessionPhase, StartGate};
use crate::registry::SessionRegistry;
use log::{debug, warn};
use shared::{ClientId, Command, CosmeticCategory, LobbyError, Participant};
use std::sync::Arc;

/// Validates participant commands against canonical state
pub struct CommandRouter {
    ctx: AuthorityContext,
    gate: StartGate,
}

impl CommandRouter {
    /// Creates a router and its start gate on the given authority
    pub fn new(ctx: AuthorityContext) -> Self {
        let gate = StartGate::new(&ctx);
        Self { ctx, gate }
    }

    pub fn gate(&self) -> &StartGate {
        &self.gate
    }

    pub fn phase(&self) -> SessionPhase {
        self.gate.phase()
    }

    /// The only identity allowed to request the start
    pub fn host(&self) -> ClientId {
        self.ctx.host()
    }

    /// Validates and applies one command, logging any rejection
    pub fn handle(
        &self,
        registry: &SessionRegistry,
        id: ClientId,
        command: Command,
        handoff: &mut dyn GameHandoff,
    ) -> Result<(), LobbyError> {
        let result = match command {
            Command::ToggleReady => self.request_toggle_ready(registry, id),
            Command::ChangeCosmetic { category, index } => {
                self.request_change_cosmetic(registry, id, category, index)
            }
            Command::RequestStart => self.request_start(registry, id, handoff),
        };

        match &result {
            Ok(()) => debug!("Applied {:?} from participant {}", command, id),
            Err(e) => warn!("Dropped {:?} from participant {}: {}", command, id, e),
        }
        result
    }

    /// Flips the requester's ready flag and republishes the ready count
    pub fn request_toggle_ready(
        &self,
        registry: &SessionRegistry,
        id: ClientId,
    ) -> Result<(), LobbyError> {
        self.ensure_lobby()?;
        let participant = Self::lookup(registry, id)?;

        let ready = participant.ready();
        ready.set(!ready.get())?;
        self.gate.refresh(registry)?;
        Ok(())
    }

    /// Selects option `index` in `category` for participant `id`
    ///
    /// The index is checked against that category's own catalog size. An
    /// out-of-range index is rejected before anything is written, so a faulty
    /// client can never push an unrenderable value to the other observers.
    pub fn request_change_cosmetic(
        &self,
        registry: &SessionRegistry,
        id: ClientId,
        category: CosmeticCategory,
        index: i32,
    ) -> Result<(), LobbyError> {
        self.ensure_lobby()?;
        let participant = Self::lookup(registry, id)?;

        let catalog = participant.catalog();
        if !catalog.contains(category, index) {
            return Err(LobbyError::InvalidIndex {
                category,
                index,
                size: catalog.size(category),
            });
        }

        participant.field(category).set(index)?;
        Ok(())
    }

    /// Starts the session if the host asks and everyone is ready
    pub fn request_start(
        &self,
        registry: &SessionRegistry,
        id: ClientId,
        handoff: &mut dyn GameHandoff,
    ) -> Result<(), LobbyError> {
        self.ensure_lobby()?;
        if id != self.ctx.host() {
            return Err(LobbyError::NotAuthorized);
        }
        self.gate.transition(registry, handoff)
    }

    /// Republishes derived session state after a join or leave
    pub fn membership_changed(&self, registry: &SessionRegistry) -> Result<(), LobbyError> {
        self.gate.refresh(registry).map(|_| ())
    }

    fn ensure_lobby(&self) -> Result<(), LobbyError> {
        match self.gate.phase() {
            SessionPhase::Lobby => Ok(()),
            SessionPhase::Started => Err(LobbyError::SessionAlreadyStarted),
        }
    }

    fn lookup(registry: &SessionRegistry, id: ClientId) -> Result<Arc<Participant>, LobbyError> {
        registry.get(id).ok_or(LobbyError::UnknownParticipant(id))
    }
}
