//! Scratch outbox for the game-thread side effects an `Action` can't perform directly. An
//! `Action` only gets `&mut World, &mut PlayerRegistry` (§4.10) — it has no `ConnectionRegistry`
//! to enqueue frames on. Instead it records what needs to go out here, and the game loop
//! flushes this queue once per tick, after actions run, when it does hold a `ConnectionRegistry`.
//!
//! Covers: `Facing_Correction`/`Position_Correction` resyncs (§4.12), the post-login packet
//! burst (§4.13), and integrity-violation kicks (§7, `IntegrityError`).

use neutronium::identity::{ConnectionId, PlayerId};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Effect {
    /// A rejected move due to facing mismatch; carries the player's unchanged facing.
    FacingCorrection(u8),
    /// A rejected move due to a blocked/out-of-bounds target tile; carries the player's
    /// unchanged authoritative position and facing so the client can resync its prediction.
    PositionCorrection { x: i16, y: i16, facing: u8 },
    /// A player finished logging in this tick and needs its welcome/snapshot burst sent.
    LoggedIn(PlayerId),
    /// The connection is gone (clean disconnect, IO error, or handshake timeout/failure) and
    /// its player, if any, needs the full departure broadcast-then-removal treatment. A
    /// `reason` sends a best-effort `Kick_Notification` before the broadcast runs.
    Departed { reason: Option<String> },
}

#[derive(Default)]
pub struct EffectSink {
    queue: Mutex<Vec<(ConnectionId, Effect)>>,
}

impl EffectSink {
    pub fn new() -> EffectSink {
        EffectSink::default()
    }

    pub fn push(&self, conn_id: ConnectionId, effect: Effect) {
        self.queue.lock().expect("effect sink poisoned").push((conn_id, effect));
    }

    pub fn drain(&self) -> Vec<(ConnectionId, Effect)> {
        std::mem::take(&mut *self.queue.lock().expect("effect sink poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_the_queue() {
        let sink = EffectSink::new();
        sink.push(ConnectionId::new(1), Effect::FacingCorrection(2));
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.drain().is_empty());
    }
}
