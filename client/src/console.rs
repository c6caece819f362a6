//! Text console front end for the lobby
//!
//! Parses typed commands and prints lobby changes as they arrive. The view
//! registers observers on mirrored fields and must be detached before the
//! mirror it watches is torn down.

use crate::mirror::LobbyMirror;
use shared::{CatalogError, CosmeticCategory, ObserverId, ReplicatedField};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    ToggleReady,
    Cycle {
        category: CosmeticCategory,
        delta: i32,
    },
    Start,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}, type 'help'")]
    UnknownCommand(String),
    #[error("'{0}' needs a category, e.g. '{0} eye'")]
    MissingCategory(String),
    #[error(transparent)]
    Category(#[from] CatalogError),
}

pub const HELP: &str = "commands: ready | next <category> | prev <category> | start | status | quit
categories: body, body_part, eye, glove, head_part, mouth_and_nose, tail";

pub fn parse_line(line: &str) -> Result<ConsoleAction, ConsoleError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ConsoleError::Empty)?.to_ascii_lowercase();

    let delta = match verb.as_str() {
        "ready" | "r" => return Ok(ConsoleAction::ToggleReady),
        "start" => return Ok(ConsoleAction::Start),
        "status" | "s" => return Ok(ConsoleAction::Status),
        "help" | "?" => return Ok(ConsoleAction::Help),
        "quit" | "exit" | "q" => return Ok(ConsoleAction::Quit),
        "next" | "n" => 1,
        "prev" | "p" => -1,
        _ => return Err(ConsoleError::UnknownCommand(verb)),
    };

    let category = words
        .next()
        .ok_or_else(|| ConsoleError::MissingCategory(verb.clone()))?
        .parse()?;
    Ok(ConsoleAction::Cycle { category, delta })
}

/// One line per participant, host and local player marked
pub fn render_status(mirror: &LobbyMirror) -> String {
    let mut out = String::new();
    let participants = mirror.participants();

    out.push_str(&format!(
        "lobby: {}/{} ready{}\n",
        mirror.players_ready(),
        participants.len(),
        if mirror.started() { ", started" } else { "" }
    ));

    for participant in participants {
        let id = participant.id();
        let mut tags = Vec::new();
        if Some(id) == mirror.host_id() {
            tags.push("host");
        }
        if Some(id) == mirror.local_identity() {
            tags.push("you");
        }

        let cosmetics: Vec<String> = CosmeticCategory::ALL
            .iter()
            .map(|c| format!("{}={}", c, participant.cosmetic(*c)))
            .collect();

        out.push_str(&format!(
            "  #{} {}{} {}\n",
            id,
            if participant.is_ready() { "Ready" } else { "Not Ready" },
            if tags.is_empty() {
                String::new()
            } else {
                format!(" ({})", tags.join(", "))
            },
            cosmetics.join(" ")
        ));
    }

    if mirror.is_host() && !mirror.started() {
        out.push_str(if mirror.can_start() {
            "everyone is ready, type 'start'\n"
        } else {
            "waiting for everyone to be ready\n"
        });
    }

    out
}

type Sink = Arc<dyn Fn(String) + Send + Sync>;

/// Prints changes to the local participant and session state
#[derive(Default)]
pub struct ConsoleView {
    flags: Vec<(ReplicatedField<bool>, ObserverId)>,
    counters: Vec<(ReplicatedField<i32>, ObserverId)>,
}

impl ConsoleView {
    /// Registers observers on the mirror, sending each message to `sink`
    pub fn attach<F>(mirror: &LobbyMirror, sink: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let sink: Sink = Arc::new(sink);
        let mut view = Self::default();

        if let Some(local) = mirror.local_participant() {
            let out = Arc::clone(&sink);
            let id = local.ready().on_change(move |_, ready| {
                out(if *ready {
                    "you are Ready".to_string()
                } else {
                    "you are Not Ready".to_string()
                });
            });
            view.flags.push((local.ready().clone(), id));

            for category in CosmeticCategory::ALL {
                let field = local.field(category);
                let size = local.catalog().size(category);
                let out = Arc::clone(&sink);
                let id = field.on_change(move |_, index| {
                    out(format!("{} -> {}/{}", category, index + 1, size));
                });
                view.counters.push((field.clone(), id));
            }
        }

        let out = Arc::clone(&sink);
        let id = mirror.players_ready_field().on_change(move |_, count| {
            out(format!("players ready: {}", count));
        });
        view.counters.push((mirror.players_ready_field().clone(), id));

        let out = Arc::clone(&sink);
        let id = mirror.started_field().on_change(move |_, started| {
            if *started {
                out("game starting!".to_string());
            }
        });
        view.flags.push((mirror.started_field().clone(), id));

        view
    }

    /// Removes every observer this view registered
    pub fn detach(&mut self) {
        for (field, id) in self.flags.drain(..) {
            field.remove_on_change(id);
        }
        for (field, id) in self.counters.drain(..) {
            field.remove_on_change(id);
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.flags.is_empty() || !self.counters.is_empty()
    }
}

impl Drop for ConsoleView {
    fn drop(&mut self) {
        self.detach();
    }
}
