//! Game-specific logic built on top of `neutronium`'s wire codec, connection state machine, and
//! world model: admission control, movement/turn authorization, view-based broadcasting, the
//! fixed-tick game loop, and the accept loop that feeds it.

pub mod accept;
pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod effects;
pub mod gameloop;
pub mod movement;
pub mod ratelimit;

use std::time::Duration;

/// Cooldown settings the dispatcher needs at decode time, lifted out of `config::GameConfig` so
/// `dispatch_live` doesn't need the whole config struct.
#[derive(Debug, Clone, Copy)]
pub struct GameSettings {
    pub move_cooldown: Duration,
    pub turn_cooldown: Duration,
    pub view_range: i16,
    pub max_header_violations: u32,
    pub ping_interval_ticks: u32,
}

impl From<&config::GameConfig> for GameSettings {
    fn from(cfg: &config::GameConfig) -> GameSettings {
        GameSettings {
            move_cooldown: Duration::from_millis(cfg.game.move_cooldown_ms),
            turn_cooldown: Duration::from_millis(cfg.game.turn_cooldown_ms),
            view_range: cfg.game.view_range,
            max_header_violations: cfg.game.max_header_violations,
            ping_interval_ticks: cfg.game.ping_interval_ticks,
        }
    }
}
