//! Session registry: who is in the lobby
//!
//! This module owns the authority-side participant roster:
//! - Participant lifecycle (add on connect, remove on disconnect)
//! - Capacity enforcement against the configured maximum
//! - Membership events queued on the replication stream
//! - Snapshot iteration that tolerates concurrent removal
//!
//! The registry is the single source of truth for lobby membership. Every
//! participant it hands out is fully initialized with default field values.

use crate::authority::AuthorityContext;
use log::{debug, info};
use shared::{Catalog, ClientId, LobbyError, Participant, SessionEvent, Update};
use std::collections::HashMap;
use std::sync::Arc;

/// Authority-side roster of lobby participants
pub struct SessionRegistry {
    /// Outbox for join and leave events
    ctx: AuthorityContext,
    /// Connected participants indexed by their identity
    participants: HashMap<ClientId, Arc<Participant>>,
    /// Maximum number of concurrent participants allowed
    max_participants: usize,
}

impl SessionRegistry {
    /// Creates an empty registry that admits at most `max_participants`
    pub fn new(ctx: AuthorityContext, max_participants: usize) -> Self {
        Self {
            ctx,
            participants: HashMap::new(),
            max_participants,
        }
    }

    /// Registers a newly connected identity
    ///
    /// Fails with `DuplicateIdentity` if the identity is already present and
    /// with `LobbyFull` at capacity. On success the participant's fields hold
    /// their defaults and a join event is queued for observers.
    pub fn add(
        &mut self,
        id: ClientId,
        catalog: Catalog,
    ) -> Result<Arc<Participant>, LobbyError> {
        if self.participants.contains_key(&id) {
            return Err(LobbyError::DuplicateIdentity(id));
        }
        if self.participants.len() >= self.max_participants {
            return Err(LobbyError::LobbyFull {
                max: self.max_participants,
            });
        }

        let participant = Arc::new(Participant::authority(id, catalog, self.ctx.outbox()));
        self.participants.insert(id, Arc::clone(&participant));
        self.ctx
            .outbox()
            .push(Update::Session(SessionEvent::ParticipantJoined(id)));

        info!(
            "Participant {} joined ({}/{})",
            id,
            self.participants.len(),
            self.max_participants
        );
        Ok(participant)
    }

    /// Removes a participant; absent identities are a silent no-op
    ///
    /// Every observer registered on the participant's fields is released so
    /// no callback outlives the participant. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, id: ClientId) -> bool {
        match self.participants.remove(&id) {
            Some(participant) => {
                participant.clear_observers();
                self.ctx
                    .outbox()
                    .push(Update::Session(SessionEvent::ParticipantLeft(id)));
                info!("Participant {} left", id);
                true
            }
            None => {
                debug!("Ignoring removal of unknown participant {}", id);
                false
            }
        }
    }

    /// Looks up a participant by identity
    pub fn get(&self, id: ClientId) -> Option<Arc<Participant>> {
        self.participants.get(&id).cloned()
    }

    /// Returns true if `id` is currently in the lobby
    pub fn contains(&self, id: ClientId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Number of participants currently in the lobby
    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Configured capacity
    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    /// Snapshot of every participant at call time, ordered by identity
    ///
    /// The returned handles stay valid if the registry changes while the
    /// caller iterates.
    pub fn all(&self) -> Vec<Arc<Participant>> {
        let mut snapshot: Vec<Arc<Participant>> = self.participants.values().cloned().collect();
        snapshot.sort_by_key(|p| p.id());
        snapshot
    }

    /// Identities of every participant, ascending
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.participants.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
