//! Client-side request stubs
//!
//! These build the commands a participant may send. They never touch the
//! mirror: the outcome is observed only through later field updates, or not
//! at all if the server drops the request.

use crate::mirror::LobbyMirror;
use shared::{Command, CosmeticCategory};

pub fn toggle_ready(mirror: &LobbyMirror) -> Option<Command> {
    mirror.local_participant().map(|_| Command::ToggleReady)
}

/// Steps the local selection in `category` by `delta`, wrapping around
pub fn change_cosmetic(
    mirror: &LobbyMirror,
    category: CosmeticCategory,
    delta: i32,
) -> Option<Command> {
    let participant = mirror.local_participant()?;
    let index = mirror
        .catalog()
        .cycle(category, participant.cosmetic(category), delta);
    Some(Command::ChangeCosmetic { category, index })
}

pub fn request_start(mirror: &LobbyMirror) -> Option<Command> {
    mirror.local_participant().map(|_| Command::RequestStart)
}
