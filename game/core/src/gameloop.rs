//! The fixed-tick game loop (§4.11): drain actions, resolve movement side effects, broadcast
//! dirty players, ping, and sleep to the next tick boundary with no catch-up accumulation. The
//! single thread that runs this is the only thread (besides IO workers touching the
//! `ConnectionRegistry`/`RateLimiter`/`ActionQueue`/`EffectSink`) that ever mutates `World` or
//! `PlayerRegistry`.

use flux::logging::{debug, warn, Logger};
use flux::time::timestamp_millis_u32;
use neutronium::action::ActionQueue;
use neutronium::identity::{ConnectionId, ConnectionIdGen};
use neutronium::net::ConnectionRegistry;
use neutronium::wire::packet;
use neutronium::world::{default_spawn, Facing, PlayerRegistry, World};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broadcast::{broadcast_departure, broadcast_dirty, broadcast_login};
use crate::effects::{Effect, EffectSink};
use crate::ratelimit::RateLimiter;
use crate::GameSettings;

/// Shared handles the game loop and the IO workers both hold `Arc`s to.
pub struct Shared {
    pub action_queue: ActionQueue,
    pub effects: Arc<EffectSink>,
    pub connections: ConnectionRegistry,
    pub rate_limiter: RateLimiter,
    pub conn_ids: ConnectionIdGen,
}

impl Shared {
    pub fn new(rate_limiter: RateLimiter) -> Shared {
        Shared {
            action_queue: ActionQueue::new(),
            effects: Arc::new(EffectSink::new()),
            connections: ConnectionRegistry::new(),
            rate_limiter,
            conn_ids: ConnectionIdGen::new(),
        }
    }
}

/// Posts the `OnLogin` action described in §4.3: creates the player at the default spawn point
/// and records a `LoggedIn` effect on success, or a `Departed` effect (duplicate login is an
/// Integrity error, §7) on failure.
pub fn post_login(shared: &Arc<Shared>, conn_id: ConnectionId) {
    let captured = shared.clone();
    shared.action_queue.push(Box::new(move |world: &mut World, registry: &mut PlayerRegistry| {
        let (x, y) = default_spawn(&world.tiles);
        match registry.create_player(conn_id, x, y, Facing::South) {
            Ok(player_id) => {
                world.add_player(player_id, x, y);
                captured.effects.push(conn_id, Effect::LoggedIn(player_id));
            }
            Err(_duplicate) => {
                captured.effects.push(
                    conn_id,
                    Effect::Departed {
                        reason: Some("duplicate login for this connection".to_string()),
                    },
                );
            }
        }
    }));
}

/// Runs the tick loop until `running` is cleared. `width`/`height` size the world once at
/// startup; the map's shape never changes afterward (§4.5).
pub fn run(
    shared: Arc<Shared>,
    settings: GameSettings,
    tick_period: Duration,
    map_width: i16,
    map_height: i16,
    running: Arc<AtomicBool>,
    logger: Logger,
) {
    let mut world = World::new(map_width, map_height);
    let mut registry = PlayerRegistry::new();
    let mut tick: u64 = 0;

    while running.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        for action in shared.action_queue.drain() {
            action(&mut world, &mut registry);
        }

        flush_effects(&shared, &mut world, &mut registry, settings.view_range);

        let dirty = registry.consume_dirty();
        broadcast_dirty(&mut world, &registry, &shared.connections, dirty, settings.view_range);

        if settings.ping_interval_ticks > 0 && tick % settings.ping_interval_ticks as u64 == 0 {
            send_pings(&shared.connections);
        }

        let elapsed = tick_start.elapsed();
        debug!(logger, "tick complete"; "tick" => tick, "elapsed_us" => elapsed.as_micros() as u64, "players" => registry.len());
        if elapsed > tick_period.mul_f64(0.8) {
            warn!(logger, "tick overran budget"; "tick" => tick, "elapsed_us" => elapsed.as_micros() as u64, "budget_us" => tick_period.as_micros() as u64);
        }

        if elapsed < tick_period {
            std::thread::sleep(tick_period - elapsed);
        }
        tick += 1;
    }
}

fn send_pings(connections: &ConnectionRegistry) {
    let ts = timestamp_millis_u32();
    for conn in connections.snapshot() {
        if conn.is_live() {
            conn.enqueue(packet::server_ping_request(ts));
            conn.note_ping_sent(ts);
        }
    }
}

fn flush_effects(shared: &Arc<Shared>, world: &mut World, registry: &mut PlayerRegistry, view_range: i16) {
    for (conn_id, effect) in shared.effects.drain() {
        match effect {
            Effect::FacingCorrection(facing) => {
                if let Some(conn) = shared.connections.get(conn_id) {
                    conn.enqueue(packet::facing_correction(facing));
                }
            }
            Effect::PositionCorrection { x, y, facing } => {
                if let Some(conn) = shared.connections.get(conn_id) {
                    conn.enqueue(packet::position_correction(x as u16, y as u16, facing));
                }
            }
            Effect::LoggedIn(player_id) => {
                broadcast_login(world, registry, &shared.connections, player_id, view_range);
            }
            Effect::Departed { reason } => {
                if let Some(reason) = &reason {
                    if let Some(conn) = shared.connections.get(conn_id) {
                        conn.enqueue(packet::kick_notification(reason));
                    }
                }
                if let Some(player_id) = registry.player_id_for_connection(conn_id) {
                    broadcast_departure(world, registry, &shared.connections, player_id, view_range);
                }
                registry.remove_by_connection_id(conn_id);
                release_connection(shared, conn_id);
            }
        }
    }
}

fn release_connection(shared: &Arc<Shared>, conn_id: ConnectionId) {
    if let Some(conn) = shared.connections.remove(conn_id) {
        if let Ok(ip) = IpAddr::from_str(&conn.peer_ip) {
            shared.rate_limiter.release(ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_login_action_creates_a_player_and_records_logged_in_effect() {
        let shared = Arc::new(Shared::new(RateLimiter::new(crate::config::GameConfig::default().rate_limit)));
        let conn_id = ConnectionId::new(1);
        post_login(&shared, conn_id);

        let mut world = World::new(32, 32);
        let mut registry = PlayerRegistry::new();
        for action in shared.action_queue.drain() {
            action(&mut world, &mut registry);
        }

        assert_eq!(registry.len(), 1);
        let effects = shared.effects.drain();
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0].1, Effect::LoggedIn(_)));
    }

    #[test]
    fn duplicate_login_on_same_connection_records_departed_effect() {
        let shared = Arc::new(Shared::new(RateLimiter::new(crate::config::GameConfig::default().rate_limit)));
        let conn_id = ConnectionId::new(7);
        post_login(&shared, conn_id);
        post_login(&shared, conn_id);

        let mut world = World::new(32, 32);
        let mut registry = PlayerRegistry::new();
        for action in shared.action_queue.drain() {
            action(&mut world, &mut registry);
        }

        let effects = shared.effects.drain();
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0].1, Effect::LoggedIn(_)));
        assert!(matches!(effects[1].1, Effect::Departed { .. }));
    }
}
