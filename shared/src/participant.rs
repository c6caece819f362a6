//! Lobby participants and their replicated fields
//!
//! A participant is only ever constructed whole: every field exists and holds
//! its default from the moment the value is returned. The same type serves the
//! authority (fields publish to an [`Outbox`]) and observers (mirror fields).

use crate::cosmetic::{Catalog, CosmeticCategory, CATEGORY_COUNT};
use crate::field::{Outbox, ReplicatedField, Role};
use crate::protocol::{ClientId, FieldId, ParticipantSnapshot};
use log::warn;

#[derive(Debug)]
/// One lobby member: a ready flag and one selection per cosmetic category
pub struct Participant {
    /// Identity assigned by the transport
    id: ClientId,
    /// Option counts the selections are bounded by
    catalog: Catalog,
    /// Whether this participant is ready to start
    ready: ReplicatedField<bool>,
    /// Selected option per category, indexed by `CosmeticCategory::index`
    cosmetics: [ReplicatedField<i32>; CATEGORY_COUNT],
}

impl Participant {
    /// Creates the canonical participant on the authority
    pub fn authority(id: ClientId, catalog: Catalog, outbox: &Outbox) -> Self {
        Self {
            id,
            catalog,
            ready: ReplicatedField::authority(FieldId::Ready(id), false, outbox.clone()),
            cosmetics: CosmeticCategory::ALL.map(|category| {
                ReplicatedField::authority(FieldId::Cosmetic(id, category), 0, outbox.clone())
            }),
        }
    }

    /// Creates an observer-side mirror with default values
    pub fn mirror(id: ClientId, catalog: Catalog) -> Self {
        Self {
            id,
            catalog,
            ready: ReplicatedField::mirror(FieldId::Ready(id), false),
            cosmetics: CosmeticCategory::ALL
                .map(|category| ReplicatedField::mirror(FieldId::Cosmetic(id, category), 0)),
        }
    }

    /// Identity of this participant
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Authority on the server, mirror on clients
    pub fn role(&self) -> Role {
        self.ready.role()
    }

    /// The replicated ready flag
    pub fn ready(&self) -> &ReplicatedField<bool> {
        &self.ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// The replicated index field for one cosmetic category
    pub fn field(&self, category: CosmeticCategory) -> &ReplicatedField<i32> {
        &self.cosmetics[category.index()]
    }

    /// Current selection in `category`
    pub fn cosmetic(&self, category: CosmeticCategory) -> i32 {
        self.field(category).get()
    }

    /// Copies every field value for the welcome packet
    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id,
            ready: self.ready.get(),
            cosmetics: CosmeticCategory::ALL.map(|category| self.cosmetic(category)),
        }
    }

    /// Brings a mirror in line with a snapshot taken on the authority
    ///
    /// Fires change callbacks for every field that differs. Ignored on the
    /// authority, whose values are canonical.
    pub fn apply_snapshot(&self, snapshot: &ParticipantSnapshot) {
        if snapshot.id != self.id {
            warn!(
                "Snapshot for participant {} applied to participant {}",
                snapshot.id, self.id
            );
            return;
        }
        if self.role() == Role::Authority {
            return;
        }

        // Mirror fields cannot refuse receive, so the results carry no information
        let _ = self.ready.receive(snapshot.ready);
        for category in CosmeticCategory::ALL {
            let _ = self.field(category).receive(snapshot.cosmetics[category.index()]);
        }
    }

    /// Deregisters every observer on every field of this participant
    pub fn clear_observers(&self) {
        self.ready.clear_observers();
        for field in &self.cosmetics {
            field.clear_observers();
        }
    }

    /// Total callbacks registered across all fields
    pub fn observer_count(&self) -> usize {
        self.ready.observer_count()
            + self
                .cosmetics
                .iter()
                .map(ReplicatedField::observer_count)
                .sum::<usize>()
    }
}
