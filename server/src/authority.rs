//! The authority context shared by registry, router and gate
//!
//! There is exactly one per session. It is built once when the session is
//! configured and handed to each component at construction instead of being
//! looked up globally.

use shared::{ClientId, Outbox, Update};

#[derive(Debug, Clone)]
pub struct AuthorityContext {
    host: ClientId,
    outbox: Outbox,
}

impl AuthorityContext {
    pub fn new(host: ClientId) -> Self {
        Self {
            host,
            outbox: Outbox::new(),
        }
    }

    /// The only identity allowed to start the session
    pub fn host(&self) -> ClientId {
        self.host
    }

    pub fn is_authority(&self) -> bool {
        true
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Takes every pending replication update in production order
    pub fn drain(&self) -> Vec<Update> {
        self.outbox.drain()
    }
}
