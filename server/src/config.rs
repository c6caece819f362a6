//! Session configuration, fixed before the lobby opens

use shared::{Catalog, ClientId};

/// Participants admitted when no limit is given
pub const DEFAULT_MAX_PLAYERS: usize = 5;

/// Identity of the first connection, which is the designated host
pub const DEFAULT_HOST_ID: ClientId = 1;

pub const DEFAULT_SCENE: &str = "Game";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyConfig {
    /// Address the TCP listener binds to
    pub bind_addr: String,
    /// Joins beyond this many participants are refused
    pub max_players: usize,
    /// Option counts per cosmetic category
    pub catalog: Catalog,
    /// The only identity allowed to start the game
    pub host_id: ClientId,
    /// Scene announced to every client when the lobby starts
    pub scene: String,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            catalog: Catalog::default(),
            host_id: DEFAULT_HOST_ID,
            scene: DEFAULT_SCENE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LobbyConfig::default();
        assert_eq!(config.max_players, 5);
        assert_eq!(config.host_id, 1);
        assert_eq!(config.scene, "Game");
        assert_eq!(config.catalog, Catalog::default());
        assert!(config.bind_addr.parse::<std::net::SocketAddr>().is_ok());
    }
}
