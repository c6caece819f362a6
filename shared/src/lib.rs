//! Types shared by the lobby authority and its observers: replicated fields,
//! the participant model, the cosmetic catalog and the wire protocol.

pub mod codec;
pub mod cosmetic;
pub mod error;
pub mod field;
pub mod participant;
pub mod protocol;

pub use cosmetic::{Catalog, CatalogError, CosmeticCategory, CATEGORY_COUNT};
pub use error::LobbyError;
pub use field::{ObserverId, Outbox, Replicable, ReplicatedField, Role};
pub use participant::Participant;
pub use protocol::{
    ClientId, Command, FieldId, FieldUpdate, FieldValue, LobbySnapshot, Packet,
    ParticipantSnapshot, SessionEvent, Update, PROTOCOL_VERSION,
};
