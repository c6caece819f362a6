use crate::commands;
use crate::console::{self, ConsoleAction, ConsoleView};
use crate::mirror::LobbyMirror;
use log::{error, info, warn};
use shared::codec::{read_packet, write_packet};
use shared::{Packet, PROTOCOL_VERSION};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Events from the socket reader task to the client loop
#[derive(Debug)]
enum NetworkEvent {
    Packet(Packet),
    Closed,
}

/// Connection state independent of any socket
///
/// Applies server packets to the mirror and turns console actions into
/// outgoing packets.
pub struct ClientSession {
    mirror: LobbyMirror,
    view: Option<ConsoleView>,
    connected: bool,
    scene: Option<String>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self {
            mirror: LobbyMirror::new(),
            view: None,
            connected: false,
            scene: None,
        }
    }

    pub fn mirror(&self) -> &LobbyMirror {
        &self.mirror
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Scene the server asked us to load, once the lobby has started
    pub fn scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Welcome(snapshot) => {
                info!(
                    "Joined lobby as participant {} (host is {})",
                    snapshot.client_id, snapshot.host_id
                );
                self.detach_view();
                self.mirror.apply_welcome(&snapshot);
                self.view = Some(ConsoleView::attach(&self.mirror, |line| println!("{}", line)));
                self.connected = true;
            }

            Packet::Replicate { updates } => self.mirror.apply_updates(&updates),

            Packet::Rejected { command, error } => {
                warn!("Server rejected {:?}: {}", command, error);
            }

            Packet::LoadScene { scene } => {
                info!("Loading scene {}", scene);
                self.scene = Some(scene);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Returns the packet to send for an action, if any
    pub fn handle_action(&mut self, action: ConsoleAction) -> Option<Packet> {
        let command = match action {
            ConsoleAction::ToggleReady => commands::toggle_ready(&self.mirror),
            ConsoleAction::Cycle { category, delta } => {
                commands::change_cosmetic(&self.mirror, category, delta)
            }
            ConsoleAction::Start => commands::request_start(&self.mirror),
            ConsoleAction::Status => {
                print!("{}", console::render_status(&self.mirror));
                None
            }
            ConsoleAction::Help => {
                println!("{}", console::HELP);
                None
            }
            ConsoleAction::Quit => return Some(Packet::Disconnect),
        };

        let wants_command = matches!(
            action,
            ConsoleAction::ToggleReady | ConsoleAction::Cycle { .. } | ConsoleAction::Start
        );
        if command.is_none() && wants_command {
            warn!("Not in a lobby yet");
        }
        command.map(Packet::Command)
    }

    /// Releases the view's observers; must run before the mirror goes away
    pub fn detach_view(&mut self) {
        if let Some(mut view) = self.view.take() {
            view.detach();
        }
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads packets until EOF or error, then reports the connection closed
async fn forward_packets<R>(reader: &mut R, events: mpsc::UnboundedSender<NetworkEvent>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_packet(reader).await {
            Ok(Some(packet)) => {
                if events.send(NetworkEvent::Packet(packet)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Error receiving packet: {}", e);
                break;
            }
        }
    }
    let _ = events.send(NetworkEvent::Closed);
}

pub struct Client {
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
    session: ClientSession,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, writer) = stream.into_split();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move { forward_packets(&mut reader, events_tx).await });

        Ok(Client {
            writer,
            events,
            session: ClientSession::new(),
        })
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        write_packet(&mut self.writer, packet).await?;
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(NetworkEvent::Packet(packet)) => {
                        self.session.handle_packet(packet);
                        if let Some(scene) = self.session.scene() {
                            println!("lobby closed, loading {}", scene);
                            break;
                        }
                    }
                    Some(NetworkEvent::Closed) | None => {
                        warn!("Connection closed by server");
                        self.session.detach_view();
                        return Ok(());
                    }
                },

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    match console::parse_line(&line) {
                        Ok(ConsoleAction::Quit) => break,
                        Ok(action) => {
                            if let Some(packet) = self.session.handle_action(action) {
                                self.send_packet(&packet).await?;
                            }
                        }
                        Err(e) => println!("{}", e),
                    }
                },
            }
        }

        self.session.detach_view();
        if self.session.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
