//! Observer-side mirror of the lobby
//!
//! Every field in here is a read-only projection of the authority's state.
//! It is written only by applying the welcome snapshot and then the update
//! stream, in the order the server sent them. Local code observes changes
//! through `on_change` callbacks on the mirrored fields.

use log::{debug, warn};
use shared::{
    Catalog, ClientId, FieldId, FieldUpdate, LobbyError, LobbySnapshot, Participant,
    ReplicatedField, SessionEvent, Update,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Client-side copy of everything the server replicates
pub struct LobbyMirror {
    /// Our identity, known after the welcome
    local_id: Option<ClientId>,
    /// Identity allowed to start the game
    host_id: Option<ClientId>,
    catalog: Catalog,
    /// Mirrored participants indexed by identity
    participants: HashMap<ClientId, Arc<Participant>>,
    players_ready: ReplicatedField<i32>,
    started: ReplicatedField<bool>,
}

impl LobbyMirror {
    pub fn new() -> Self {
        Self {
            local_id: None,
            host_id: None,
            catalog: Catalog::default(),
            participants: HashMap::new(),
            players_ready: ReplicatedField::mirror(FieldId::PlayersReady, 0),
            started: ReplicatedField::mirror(FieldId::GameStarting, false),
        }
    }

    /// Identity assigned by the server, present once welcomed
    pub fn local_identity(&self) -> Option<ClientId> {
        self.local_id
    }

    pub fn is_authority(&self) -> bool {
        false
    }

    pub fn host_id(&self) -> Option<ClientId> {
        self.host_id
    }

    /// Whether the local participant is the designated host
    pub fn is_host(&self) -> bool {
        self.local_id.is_some() && self.local_id == self.host_id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Looks up a mirrored participant by identity
    pub fn participant(&self, id: ClientId) -> Option<Arc<Participant>> {
        self.participants.get(&id).cloned()
    }

    pub fn local_participant(&self) -> Option<Arc<Participant>> {
        self.local_id.and_then(|id| self.participant(id))
    }

    /// Snapshot of every mirrored participant, ordered by identity
    pub fn participants(&self) -> Vec<Arc<Participant>> {
        let mut all: Vec<Arc<Participant>> = self.participants.values().cloned().collect();
        all.sort_by_key(|p| p.id());
        all
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    /// Ready count as last published by the server
    pub fn players_ready(&self) -> i32 {
        self.players_ready.get()
    }

    /// Whether the server has started the game
    pub fn started(&self) -> bool {
        self.started.get()
    }

    pub fn players_ready_field(&self) -> &ReplicatedField<i32> {
        &self.players_ready
    }

    pub fn started_field(&self) -> &ReplicatedField<bool> {
        &self.started
    }

    /// Whether the start control should be enabled
    ///
    /// Mirrors the authority's gate for display only; the server still makes
    /// the real decision when the request arrives.
    pub fn can_start(&self) -> bool {
        !self.started()
            && !self.participants.is_empty()
            && self.participants.values().all(|p| p.is_ready())
    }

    /// Replaces local state with the authority's full snapshot
    pub fn apply_welcome(&mut self, snapshot: &LobbySnapshot) {
        self.local_id = Some(snapshot.client_id);
        self.host_id = Some(snapshot.host_id);
        self.catalog = snapshot.catalog;

        self.participants.retain(|id, participant| {
            let keep = snapshot.participants.iter().any(|p| p.id == *id);
            if !keep {
                participant.clear_observers();
            }
            keep
        });

        for entry in &snapshot.participants {
            let catalog = self.catalog;
            let participant = self
                .participants
                .entry(entry.id)
                .or_insert_with(|| Arc::new(Participant::mirror(entry.id, catalog)));
            participant.apply_snapshot(entry);
        }

        Self::log_rejection(self.players_ready.receive(snapshot.players_ready));
        Self::log_rejection(self.started.receive(snapshot.game_starting));
    }

    pub fn apply_updates(&mut self, updates: &[Update]) {
        for update in updates {
            self.apply_update(*update);
        }
    }

    /// Applies one entry of the replication stream
    pub fn apply_update(&mut self, update: Update) {
        if self.local_id.is_none() {
            debug!("Ignoring {:?} received before welcome", update);
            return;
        }

        match update {
            Update::Session(SessionEvent::ParticipantJoined(id)) => {
                if self.participants.contains_key(&id) {
                    return;
                }
                self.participants
                    .insert(id, Arc::new(Participant::mirror(id, self.catalog)));
            }
            Update::Session(SessionEvent::ParticipantLeft(id)) => {
                if let Some(participant) = self.participants.remove(&id) {
                    participant.clear_observers();
                }
            }
            Update::Field(FieldUpdate { field, value }) => {
                let result = match field {
                    FieldId::Ready(id) => match self.participants.get(&id) {
                        Some(p) => p.ready().receive_value(value),
                        None => Err(LobbyError::UnknownParticipant(id)),
                    },
                    FieldId::Cosmetic(id, category) => match self.participants.get(&id) {
                        Some(p) => p.field(category).receive_value(value),
                        None => Err(LobbyError::UnknownParticipant(id)),
                    },
                    FieldId::PlayersReady => self.players_ready.receive_value(value),
                    FieldId::GameStarting => self.started.receive_value(value),
                };
                Self::log_rejection(result);
            }
        }
    }

    /// Releases every observer registered on any mirrored field
    pub fn clear_observers(&self) {
        for participant in self.participants.values() {
            participant.clear_observers();
        }
        self.players_ready.clear_observers();
        self.started.clear_observers();
    }

    fn log_rejection(result: Result<bool, LobbyError>) {
        if let Err(e) = result {
            warn!("Dropped replicated update: {}", e);
        }
    }
}

impl Default for LobbyMirror {
    fn default() -> Self {
        Self::new()
    }
}
