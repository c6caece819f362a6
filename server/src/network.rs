//! Server network layer handling TCP connections and the authority loop

use crate::authority::AuthorityContext;
use crate::config::LobbyConfig;
use crate::gate::{GameHandoff, SessionPhase};
use crate::registry::SessionRegistry;
use crate::router::CommandRouter;
use log::{debug, error, info, warn};
use shared::codec::{read_packet, write_packet};
use shared::{
    Catalog, ClientId, LobbyError, LobbySnapshot, Packet, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent from network tasks to the authority loop
#[derive(Debug)]
pub enum ServerMessage {
    ConnectionOpened {
        client_id: ClientId,
        stream: TcpStream,
        addr: SocketAddr,
    },
    PacketReceived {
        client_id: ClientId,
        packet: Packet,
    },
    ConnectionClosed {
        client_id: ClientId,
    },
}

/// Announces the scene change to every client once the lobby starts
#[derive(Debug)]
pub struct SceneHandoff {
    /// Scene every client is told to load
    scene: String,
    /// Roster of the last handoff, until its packet is taken
    pending: Option<Vec<ClientId>>,
}

impl SceneHandoff {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            pending: None,
        }
    }

    /// Returns the scene-load packet if a handoff happened since the last call
    pub fn take_packet(&mut self) -> Option<Packet> {
        self.pending.take().map(|roster| {
            info!("Loading scene {:?} for {:?}", self.scene, roster);
            Packet::LoadScene {
                scene: self.scene.clone(),
            }
        })
    }
}

impl GameHandoff for SceneHandoff {
    fn hand_off(&mut self, roster: &[ClientId]) {
        self.pending = Some(roster.to_vec());
    }
}

/// Transport-level state for one TCP connection
struct Connection {
    /// Peer address, for logging
    addr: SocketAddr,
    /// Queue feeding the writer task; dropping it closes the write side
    outgoing: mpsc::UnboundedSender<Packet>,
    /// Task decoding inbound frames into `ServerMessage`s
    reader: JoinHandle<()>,
    /// Task encoding queued packets onto the socket
    writer: JoinHandle<()>,
    /// Set once the connection has completed the handshake and is in the registry
    joined: bool,
}

impl Connection {
    /// Queues a packet for the writer task
    fn send(&self, packet: Packet) {
        if self.outgoing.send(packet).is_err() {
            debug!("Writer for {} already closed", self.addr);
        }
    }

    /// Stops reading from the peer; queued packets are still written
    fn close(self) {
        self.reader.abort();
    }
}

/// Lobby server: owns the canonical state and serializes every mutation
/// through one loop
pub struct Server {
    /// Taken by the acceptor task when `run` starts
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    /// Catalog every participant is created with
    catalog: Catalog,

    ctx: AuthorityContext,
    registry: SessionRegistry,
    router: CommandRouter,
    handoff: SceneHandoff,
    /// Open connections, joined or not, by assigned identity
    connections: HashMap<ClientId, Connection>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: LobbyConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "Lobby listening on {} (max {} players, host {}, catalog {})",
            local_addr, config.max_players, config.host_id, config.catalog
        );

        let ctx = AuthorityContext::new(config.host_id);
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            catalog: config.catalog,
            registry: SessionRegistry::new(ctx.clone(), config.max_players),
            router: CommandRouter::new(ctx.clone()),
            handoff: SceneHandoff::new(config.scene),
            ctx,
            connections: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    /// Address actually bound, useful when the configured port is 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> SessionPhase {
        self.router.phase()
    }

    /// Spawns task that accepts connections and assigns identities
    ///
    /// Identities count up from 1 and are never reused within a session.
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_client_id: ClientId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;

                        let message = ServerMessage::ConnectionOpened {
                            client_id,
                            stream,
                            addr,
                        };
                        if server_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the reader and writer tasks for a new connection
    fn open_connection(&mut self, client_id: ClientId, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle for {}: {}", addr, e);
        }
        let (mut reader, mut writer) = stream.into_split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Packet>();

        let server_tx = self.server_tx.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(Some(packet)) => {
                        let message = ServerMessage::PacketReceived { client_id, packet };
                        if server_tx.send(message).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Dropping connection {}: {}", client_id, e);
                        break;
                    }
                }
            }
            let _ = server_tx.send(ServerMessage::ConnectionClosed { client_id });
        });

        let writer = tokio::spawn(async move {
            while let Some(packet) = outgoing_rx.recv().await {
                if let Err(e) = write_packet(&mut writer, &packet).await {
                    error!("Failed to send to client {}: {}", client_id, e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        debug!("Connection {} opened from {}", client_id, addr);
        self.connections.insert(
            client_id,
            Connection {
                addr,
                outgoing,
                reader,
                writer,
                joined: false,
            },
        );
    }

    /// Sends a final packet and closes the connection
    ///
    /// Nothing more is read from a refused connection, so it cannot retry the
    /// handshake on the same socket.
    fn refuse(&mut self, client_id: ClientId, reason: &str) {
        if let Some(connection) = self.connections.remove(&client_id) {
            info!("Refusing {} ({}): {}", client_id, connection.addr, reason);
            connection.send(Packet::Disconnected {
                reason: reason.to_string(),
            });
            connection.close();
        }
    }

    /// Queues a packet for one connection, joined or not
    fn send_to(&self, client_id: ClientId, packet: Packet) {
        if let Some(connection) = self.connections.get(&client_id) {
            connection.send(packet);
        }
    }

    /// Queues a packet for every joined connection
    fn broadcast(&self, packet: &Packet) {
        for connection in self.connections.values().filter(|c| c.joined) {
            connection.send(packet.clone());
        }
    }

    /// Drains the replication stream to every joined observer, in order
    fn flush(&mut self) {
        let updates = self.ctx.drain();
        if !updates.is_empty() {
            self.broadcast(&Packet::Replicate { updates });
        }
        if let Some(packet) = self.handoff.take_packet() {
            self.broadcast(&packet);
        }
    }

    /// Full lobby state as seen by `client_id`, sent on join
    pub fn snapshot_for(&self, client_id: ClientId) -> LobbySnapshot {
        LobbySnapshot {
            client_id,
            host_id: self.ctx.host(),
            catalog: self.catalog,
            players_ready: self.router.gate().players_ready(),
            game_starting: self.router.phase() == SessionPhase::Started,
            participants: self.registry.all().iter().map(|p| p.snapshot()).collect(),
        }
    }

    /// Admits an open connection that has not joined yet
    fn handle_connect(&mut self, client_id: ClientId, client_version: u32) {
        match self.connections.get(&client_id) {
            Some(connection) if !connection.joined => {}
            Some(_) => {
                warn!("Ignoring repeated connect from participant {}", client_id);
                return;
            }
            None => {
                debug!("Ignoring connect from closed connection {}", client_id);
                return;
            }
        }

        if client_version != PROTOCOL_VERSION {
            self.refuse(client_id, "Protocol version mismatch");
            return;
        }
        if self.router.phase() == SessionPhase::Started {
            self.refuse(client_id, "Game already started");
            return;
        }

        match self.registry.add(client_id, self.catalog) {
            Ok(_) => {
                if let Err(e) = self.router.membership_changed(&self.registry) {
                    error!("Failed to refresh ready count: {}", e);
                }
                if let Some(connection) = self.connections.get_mut(&client_id) {
                    connection.joined = true;
                }
                self.send_to(client_id, Packet::Welcome(self.snapshot_for(client_id)));
            }
            Err(LobbyError::LobbyFull { .. }) => self.refuse(client_id, "Lobby is full"),
            Err(e) => warn!("Ignoring connect from {}: {}", client_id, e),
        }
    }

    /// Removes a participant and closes its connection; both are optional
    fn handle_leave(&mut self, client_id: ClientId) {
        if self.registry.remove(client_id) {
            if let Err(e) = self.router.membership_changed(&self.registry) {
                error!("Failed to refresh ready count: {}", e);
            }
        }
        if let Some(connection) = self.connections.remove(&client_id) {
            debug!("Connection {} closed", client_id);
            connection.close();
        }
    }

    /// Processes one network event against canonical state
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionOpened {
                client_id,
                stream,
                addr,
            } => self.open_connection(client_id, stream, addr),

            ServerMessage::PacketReceived { client_id, packet } => match packet {
                Packet::Connect { client_version } => {
                    info!(
                        "Client {} connecting (version: {})",
                        client_id, client_version
                    );
                    self.handle_connect(client_id, client_version);
                }
                Packet::Command(command) => {
                    let result =
                        self.router
                            .handle(&self.registry, client_id, command, &mut self.handoff);
                    if let Err(error) = result {
                        self.send_to(client_id, Packet::Rejected { command, error });
                    }
                }
                Packet::Disconnect => self.handle_leave(client_id),
                _ => warn!("Unexpected packet type from client {}", client_id),
            },

            ServerMessage::ConnectionClosed { client_id } => self.handle_leave(client_id),
        }

        self.flush();
    }

    /// Main server loop; every registry and field mutation happens here
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();
        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            self.handle_message(message);
        }

        info!("Server shutting down");
        Ok(())
    }

    /// Tells every connected client the server is going away and waits
    /// briefly for the goodbye to be written
    pub async fn shutdown(&mut self) {
        for (client_id, connection) in self.connections.drain() {
            connection.send(Packet::Disconnected {
                reason: "Server shutting down".to_string(),
            });
            connection.reader.abort();
            drop(connection.outgoing);
            if tokio::time::timeout(Duration::from_millis(500), connection.writer)
                .await
                .is_err()
            {
                warn!("Timed out flushing goodbye to client {}", client_id);
            }
        }
    }
}
