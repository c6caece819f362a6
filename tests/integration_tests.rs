//! Integration tests for the lobby
//!
//! These tests drive the authority and one or more mirrors together, first
//! in-process and then over real TCP connections.

use client::mirror::LobbyMirror;
use client::network::ClientSession;
use server::authority::AuthorityContext;
use server::config::LobbyConfig;
use server::gate::{GameHandoff, SessionPhase};
use server::network::Server;
use server::registry::SessionRegistry;
use server::router::CommandRouter;
use shared::codec::{read_packet, write_packet};
use shared::{
    Catalog, ClientId, Command, CosmeticCategory, LobbyError, LobbySnapshot, Packet,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// IN-PROCESS REPLICATION TESTS
mod lobby_flow_tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHandoff {
        rosters: Vec<Vec<ClientId>>,
    }

    impl GameHandoff for RecordingHandoff {
        fn hand_off(&mut self, roster: &[ClientId]) {
            self.rosters.push(roster.to_vec());
        }
    }

    /// Authority plus one mirror per participant, synced by hand
    struct Lobby {
        ctx: AuthorityContext,
        catalog: Catalog,
        registry: SessionRegistry,
        router: CommandRouter,
        handoff: RecordingHandoff,
        mirrors: Vec<LobbyMirror>,
    }

    impl Lobby {
        fn new(catalog: Catalog, ids: &[ClientId]) -> Self {
            let ctx = AuthorityContext::new(ids[0]);
            let mut lobby = Self {
                registry: SessionRegistry::new(ctx.clone(), 5),
                router: CommandRouter::new(ctx.clone()),
                handoff: RecordingHandoff::default(),
                mirrors: Vec::new(),
                catalog,
                ctx,
            };

            for id in ids {
                lobby.registry.add(*id, catalog).unwrap();
            }
            lobby.router.membership_changed(&lobby.registry).unwrap();
            lobby.ctx.drain();

            for id in ids {
                let mut mirror = LobbyMirror::new();
                mirror.apply_welcome(&lobby.snapshot_for(*id));
                lobby.mirrors.push(mirror);
            }
            lobby
        }

        fn snapshot_for(&self, client_id: ClientId) -> LobbySnapshot {
            LobbySnapshot {
                client_id,
                host_id: self.ctx.host(),
                catalog: self.catalog,
                players_ready: self.router.gate().players_ready(),
                game_starting: self.router.phase() == SessionPhase::Started,
                participants: self.registry.all().iter().map(|p| p.snapshot()).collect(),
            }
        }

        fn send(&mut self, id: ClientId, command: Command) -> Result<(), LobbyError> {
            self.router
                .handle(&self.registry, id, command, &mut self.handoff)
        }

        fn leave(&mut self, id: ClientId) {
            self.registry.remove(id);
            self.router.membership_changed(&self.registry).unwrap();
        }

        /// Delivers everything queued since the last sync to every mirror
        fn sync(&mut self) {
            let updates = self.ctx.drain();
            for mirror in &mut self.mirrors {
                mirror.apply_updates(&updates);
            }
        }
    }

    #[test]
    fn start_waits_for_everyone_ready() {
        let mut lobby = Lobby::new(Catalog::default(), &[1, 2]);

        lobby.send(1, Command::ToggleReady).unwrap();
        lobby.sync();

        assert_eq!(
            lobby.send(1, Command::RequestStart),
            Err(LobbyError::NotAllReady)
        );
        assert!(lobby.handoff.rosters.is_empty());
        assert!(lobby.ctx.drain().is_empty());

        for mirror in &lobby.mirrors {
            assert_eq!(mirror.players_ready(), 1);
            assert!(!mirror.started());
            assert!(!mirror.can_start());
        }

        lobby.send(2, Command::ToggleReady).unwrap();
        lobby.send(1, Command::RequestStart).unwrap();
        lobby.sync();

        assert_eq!(lobby.handoff.rosters, vec![vec![1, 2]]);
        for mirror in &lobby.mirrors {
            assert_eq!(mirror.players_ready(), 2);
            assert!(mirror.started());
        }
    }

    #[test]
    fn out_of_range_cosmetic_never_reaches_observers() {
        let catalog = Catalog::new([4, 3, 3, 3, 4, 3, 3]).unwrap();
        let mut lobby = Lobby::new(catalog, &[1, 2]);

        assert_eq!(
            lobby.send(
                1,
                Command::ChangeCosmetic {
                    category: CosmeticCategory::Eye,
                    index: 5
                }
            ),
            Err(LobbyError::InvalidIndex {
                category: CosmeticCategory::Eye,
                index: 5,
                size: 3
            })
        );
        lobby.sync();

        for mirror in &lobby.mirrors {
            assert_eq!(
                mirror.participant(1).unwrap().cosmetic(CosmeticCategory::Eye),
                0
            );
        }

        // Index 3 is fine for Body (size 4) but not for Eye (size 3)
        lobby
            .send(
                1,
                Command::ChangeCosmetic {
                    category: CosmeticCategory::Body,
                    index: 3,
                },
            )
            .unwrap();
        lobby.sync();

        for mirror in &lobby.mirrors {
            assert_eq!(
                mirror.participant(1).unwrap().cosmetic(CosmeticCategory::Body),
                3
            );
        }
    }

    #[test]
    fn command_racing_a_disconnect_is_dropped() {
        let mut lobby = Lobby::new(Catalog::default(), &[1, 2]);
        let departed = lobby.mirrors[0].participant(2).unwrap();

        lobby.leave(2);
        assert_eq!(
            lobby.send(2, Command::ToggleReady),
            Err(LobbyError::UnknownParticipant(2))
        );
        lobby.sync();

        assert_eq!(lobby.mirrors[0].count(), 1);
        assert!(lobby.mirrors[0].participant(2).is_none());
        assert!(!departed.is_ready());

        // The host alone may now start
        lobby.send(1, Command::ToggleReady).unwrap();
        lobby.send(1, Command::RequestStart).unwrap();
        assert_eq!(lobby.handoff.rosters, vec![vec![1]]);
    }

    #[test]
    fn session_is_terminal_after_start() {
        let mut lobby = Lobby::new(Catalog::default(), &[1, 2]);
        lobby.send(1, Command::ToggleReady).unwrap();
        lobby.send(2, Command::ToggleReady).unwrap();
        lobby.send(1, Command::RequestStart).unwrap();
        lobby.sync();

        for (id, command) in [
            (1, Command::RequestStart),
            (2, Command::RequestStart),
            (2, Command::ToggleReady),
            (
                1,
                Command::ChangeCosmetic {
                    category: CosmeticCategory::Tail,
                    index: 1,
                },
            ),
        ] {
            assert_eq!(
                lobby.send(id, command),
                Err(LobbyError::SessionAlreadyStarted)
            );
        }

        assert!(lobby.ctx.drain().is_empty());
        assert_eq!(lobby.handoff.rosters.len(), 1);
    }

    #[test]
    fn mirror_callbacks_follow_authority_order() {
        let mut lobby = Lobby::new(Catalog::default(), &[1, 2]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        lobby.mirrors[1]
            .participant(1)
            .unwrap()
            .field(CosmeticCategory::Glove)
            .on_change(move |_, new| log.lock().unwrap().push(*new));

        for index in [2, 1, 1, 0] {
            lobby
                .send(
                    1,
                    Command::ChangeCosmetic {
                        category: CosmeticCategory::Glove,
                        index,
                    },
                )
                .unwrap();
        }
        lobby.sync();

        // The repeated 1 is suppressed at the authority
        assert_eq!(*seen.lock().unwrap(), vec![2, 1, 0]);
    }
}

/// TCP CLIENT-SERVER TESTS
mod network_tests {
    use super::*;

    const STEP: Duration = Duration::from_secs(5);

    async fn start_server(max_players: usize) -> SocketAddr {
        let config = LobbyConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            max_players,
            ..LobbyConfig::default()
        };
        let mut server = Server::new(config).await.expect("Failed to bind server");
        let addr = server.local_addr();

        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    /// A raw TCP peer driving a client session
    struct Peer {
        stream: TcpStream,
        session: ClientSession,
        rejections: Vec<(Command, LobbyError)>,
        disconnect_reason: Option<String>,
        welcomes: usize,
    }

    impl Peer {
        /// Opens a socket without sending the handshake
        async fn open(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.expect("Failed to connect"),
                session: ClientSession::new(),
                rejections: Vec::new(),
                disconnect_reason: None,
                welcomes: 0,
            }
        }

        async fn connect(addr: SocketAddr) -> Self {
            let mut peer = Self::open(addr).await;
            peer.send(Packet::Connect {
                client_version: PROTOCOL_VERSION,
            })
            .await;
            peer
        }

        async fn join(addr: SocketAddr) -> Self {
            let mut peer = Self::connect(addr).await;
            peer.pump_until(|p| p.session.mirror().local_identity().is_some())
                .await;
            peer
        }

        async fn send(&mut self, packet: Packet) {
            write_packet(&mut self.stream, &packet)
                .await
                .expect("Failed to send packet");
        }

        /// Sends on a socket the server may already have closed
        async fn try_send(&mut self, packet: Packet) {
            let _ = write_packet(&mut self.stream, &packet).await;
        }

        async fn command(&mut self, command: Command) {
            self.send(Packet::Command(command)).await;
        }

        fn apply(&mut self, packet: Packet) {
            match packet {
                Packet::Rejected { command, error } => self.rejections.push((command, error)),
                Packet::Disconnected { reason } => {
                    self.disconnect_reason = Some(reason.clone());
                    self.session.handle_packet(Packet::Disconnected { reason });
                }
                Packet::Welcome(snapshot) => {
                    self.welcomes += 1;
                    self.session.handle_packet(Packet::Welcome(snapshot));
                }
                other => self.session.handle_packet(other),
            }
        }

        /// Applies packets until the server closes the connection
        async fn wait_closed(&mut self) {
            loop {
                let read = timeout(STEP, read_packet(&mut self.stream))
                    .await
                    .expect("Timed out waiting for the server to close");
                match read {
                    Ok(Some(packet)) => self.apply(packet),
                    Ok(None) | Err(_) => return,
                }
            }
        }

        /// Reads and applies packets until `done` holds
        async fn pump_until(&mut self, done: impl Fn(&Peer) -> bool) {
            while !done(self) {
                let packet = timeout(STEP, read_packet(&mut self.stream))
                    .await
                    .expect("Timed out waiting for server")
                    .expect("Failed to read packet")
                    .expect("Server closed the connection");
                self.apply(packet);
            }
        }

        fn mirror(&self) -> &LobbyMirror {
            self.session.mirror()
        }

        fn close(mut self) {
            self.session.detach_view();
        }
    }

    #[tokio::test]
    async fn full_lobby_round_trip() {
        let addr = start_server(5).await;

        let mut host = Peer::join(addr).await;
        assert_eq!(host.mirror().local_identity(), Some(1));
        assert!(host.mirror().is_host());

        let mut guest = Peer::join(addr).await;
        assert_eq!(guest.mirror().local_identity(), Some(2));
        assert!(!guest.mirror().is_host());
        assert_eq!(guest.mirror().count(), 2);
        host.pump_until(|p| p.mirror().count() == 2).await;

        guest.command(Command::RequestStart).await;
        guest.pump_until(|p| !p.rejections.is_empty()).await;
        assert_eq!(
            guest.rejections.pop(),
            Some((Command::RequestStart, LobbyError::NotAuthorized))
        );

        host.command(Command::ToggleReady).await;
        host.command(Command::RequestStart).await;
        host.pump_until(|p| !p.rejections.is_empty()).await;
        assert_eq!(
            host.rejections.pop(),
            Some((Command::RequestStart, LobbyError::NotAllReady))
        );
        assert!(host.mirror().local_participant().unwrap().is_ready());

        let bad_eye = Command::ChangeCosmetic {
            category: CosmeticCategory::Eye,
            index: 99,
        };
        guest.command(bad_eye).await;
        guest.pump_until(|p| !p.rejections.is_empty()).await;
        assert!(matches!(
            guest.rejections.pop(),
            Some((_, LobbyError::InvalidIndex { index: 99, .. }))
        ));

        guest
            .command(Command::ChangeCosmetic {
                category: CosmeticCategory::Eye,
                index: 2,
            })
            .await;
        guest.command(Command::ToggleReady).await;
        host.pump_until(|p| {
            p.mirror()
                .participant(2)
                .is_some_and(|g| g.is_ready() && g.cosmetic(CosmeticCategory::Eye) == 2)
        })
        .await;
        assert_eq!(host.mirror().players_ready(), 2);
        assert!(host.mirror().can_start());

        host.command(Command::RequestStart).await;
        host.pump_until(|p| p.session.scene().is_some()).await;
        guest.pump_until(|p| p.session.scene().is_some()).await;

        assert_eq!(host.session.scene(), Some("Game"));
        assert!(host.mirror().started());
        assert!(guest.mirror().started());

        host.close();
        guest.close();
    }

    #[tokio::test]
    async fn departure_reaches_other_observers() {
        let addr = start_server(5).await;

        let mut host = Peer::join(addr).await;
        let guest = Peer::join(addr).await;
        host.pump_until(|p| p.mirror().count() == 2).await;

        guest.close();
        host.pump_until(|p| p.mirror().count() == 1).await;
        assert!(host.mirror().participant(2).is_none());

        host.close();
    }

    #[tokio::test]
    async fn lobby_full_is_refused() {
        let addr = start_server(1).await;

        let host = Peer::join(addr).await;
        let mut late = Peer::connect(addr).await;
        late.pump_until(|p| p.disconnect_reason.is_some()).await;

        assert_eq!(late.disconnect_reason.as_deref(), Some("Lobby is full"));
        assert_eq!(late.mirror().local_identity(), None);

        host.close();
        late.close();
    }

    #[tokio::test]
    async fn protocol_mismatch_is_refused() {
        let addr = start_server(5).await;

        let mut peer = Peer::open(addr).await;
        peer.send(Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
        })
        .await;
        peer.pump_until(|p| p.disconnect_reason.is_some()).await;

        assert_eq!(
            peer.disconnect_reason.as_deref(),
            Some("Protocol version mismatch")
        );
    }

    #[tokio::test]
    async fn refused_connection_cannot_retry_handshake() {
        let addr = start_server(5).await;

        let mut refused = Peer::open(addr).await;
        refused
            .send(Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
            })
            .await;
        refused.pump_until(|p| p.disconnect_reason.is_some()).await;

        refused
            .try_send(Packet::Connect {
                client_version: PROTOCOL_VERSION,
            })
            .await;
        refused.try_send(Packet::Command(Command::ToggleReady)).await;
        refused.wait_closed().await;
        assert_eq!(refused.welcomes, 0);

        // Identity 1 went to the refused socket; the lobby must not hold it
        let mut player = Peer::join(addr).await;
        assert_eq!(player.mirror().local_identity(), Some(2));
        assert_eq!(player.mirror().count(), 1);
        assert!(player.mirror().participant(1).is_none());

        player.command(Command::ToggleReady).await;
        player.pump_until(|p| p.mirror().players_ready() == 1).await;
        assert!(player.mirror().can_start());

        player.close();
    }

    #[tokio::test]
    async fn departed_participant_cannot_rejoin_on_same_socket() {
        let addr = start_server(5).await;

        let mut host = Peer::join(addr).await;
        let mut guest = Peer::join(addr).await;
        host.pump_until(|p| p.mirror().count() == 2).await;

        guest.send(Packet::Disconnect).await;
        guest
            .try_send(Packet::Connect {
                client_version: PROTOCOL_VERSION,
            })
            .await;
        guest.wait_closed().await;
        assert_eq!(guest.welcomes, 1);

        host.pump_until(|p| p.mirror().count() == 1).await;

        let newcomer = Peer::join(addr).await;
        assert_eq!(newcomer.mirror().local_identity(), Some(3));
        assert_eq!(newcomer.mirror().count(), 2);
        assert!(newcomer.mirror().participant(2).is_none());

        host.close();
        guest.close();
        newcomer.close();
    }

    #[tokio::test]
    async fn repeated_connect_is_ignored() {
        let addr = start_server(5).await;

        let mut host = Peer::join(addr).await;
        let mut guest = Peer::join(addr).await;
        host.pump_until(|p| p.mirror().count() == 2).await;

        guest
            .send(Packet::Connect {
                client_version: PROTOCOL_VERSION,
            })
            .await;
        // Commands are handled in order, so this reply follows any reaction
        // to the repeated connect
        guest.command(Command::RequestStart).await;
        guest.pump_until(|p| !p.rejections.is_empty()).await;

        assert_eq!(
            guest.rejections,
            vec![(Command::RequestStart, LobbyError::NotAuthorized)]
        );
        assert_eq!(guest.welcomes, 1);
        assert!(guest.disconnect_reason.is_none());
        assert_eq!(guest.mirror().count(), 2);

        host.close();
        guest.close();
    }

    #[tokio::test]
    async fn join_after_start_is_refused() {
        let addr = start_server(5).await;

        let mut host = Peer::join(addr).await;
        host.command(Command::ToggleReady).await;
        host.command(Command::RequestStart).await;
        host.pump_until(|p| p.session.scene().is_some()).await;

        let mut late = Peer::connect(addr).await;
        late.pump_until(|p| p.disconnect_reason.is_some()).await;

        assert_eq!(
            late.disconnect_reason.as_deref(),
            Some("Game already started")
        );
        assert_eq!(late.welcomes, 0);
        assert_eq!(late.mirror().local_identity(), None);

        host.close();
        late.close();
    }
}
