#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Core engine: the wire codec, the per-connection network state machine, and the
//! authoritative world model (tile map, spatial index, visibility tracker, player registry).
//!
//! Everything under `world` is annotated "game-thread only" in its doc comments; nothing in
//! this crate enforces that with a runtime lock, by design (see the thread-affinity design
//! note in the root `DESIGN.md`) — callers are expected to run `world`/`action` exclusively
//! from the single game thread.

pub mod action;
pub mod identity;
pub mod net;
pub mod wire;
pub mod world;
