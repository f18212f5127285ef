//! Per-connection network state: the handshake state machine, the pipelined frame reader, the
//! send queue, ping/RTT tracking, and the single-shot disconnect path. `registry` is the
//! thread-safe map every IO worker and the game thread share to resolve a `ConnectionId` to a
//! live handle.

pub mod connection;
pub mod registry;

pub use connection::{Connection, ConnState, ReadOutcome};
pub use registry::ConnectionRegistry;
