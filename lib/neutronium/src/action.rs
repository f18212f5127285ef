//! Mutex-protected inbox of closures from IO worker threads to the game thread (§4.10). IO
//! workers push; the game thread drains by swapping the whole queue out under the lock so
//! handlers never run while it's held.

use crate::world::{PlayerRegistry, World};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One deferred mutation of world state, run with exclusive (single-threaded) access on the
/// game thread.
pub type Action = Box<dyn FnOnce(&mut World, &mut PlayerRegistry) + Send>;

#[derive(Default)]
pub struct ActionQueue {
    queue: Mutex<VecDeque<Action>>,
}

impl ActionQueue {
    pub fn new() -> ActionQueue {
        ActionQueue::default()
    }

    /// Enqueues an action. Callable from any thread.
    pub fn push(&self, action: Action) {
        self.queue.lock().expect("action queue poisoned").push_back(action);
    }

    /// Swaps the queue into a local `VecDeque`, releasing the lock before returning so the
    /// caller can run each action without holding it — actions never re-enter `push` while the
    /// lock is held, but this also means a producer racing the drain sees an empty queue it can
    /// push into immediately rather than blocking on handler execution.
    pub fn drain(&self) -> VecDeque<Action> {
        let mut queue = self.queue.lock().expect("action queue poisoned");
        std::mem::take(&mut *queue)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().expect("action queue poisoned").is_empty()
    }
}
