//! Layered startup configuration: built-in defaults, optionally overridden by a TOML file given
//! on the command line (§6.2, §10.2). The one operator override read straight from the
//! environment is the log level; that lookup lives in the binary's `main`, not here.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 28008;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Server {
    pub address: String,
    pub max_clients: u32,
    /// Game-loop tick rate in Hz (§4.11 default 20).
    pub tick_hz: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Game {
    pub move_cooldown_ms: u64,
    pub turn_cooldown_ms: u64,
    pub view_range: i16,
    pub handshake_timeout_secs: u64,
    pub ping_interval_ticks: u32,
    pub max_header_violations: u32,
    pub map_width: i16,
    pub map_height: i16,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateLimit {
    pub rate_window_secs: u64,
    pub rate_max: u32,
    pub per_ip_cap: u32,
    pub strike_threshold: u32,
    pub ban_duration_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GameConfig {
    pub server: Server,
    pub game: Game,
    pub rate_limit: RateLimit,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            server: Server {
                address: format!("0.0.0.0:{}", DEFAULT_PORT),
                max_clients: 256,
                tick_hz: 20,
            },
            game: Game {
                move_cooldown_ms: 330,
                turn_cooldown_ms: 200,
                view_range: 10,
                handshake_timeout_secs: 5,
                ping_interval_ticks: 20,
                max_header_violations: 5,
                map_width: 256,
                map_height: 256,
            },
            rate_limit: RateLimit {
                rate_window_secs: 60,
                rate_max: 10,
                per_ip_cap: 4,
                strike_threshold: 5,
                ban_duration_secs: 300,
            },
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> GameConfig {
        serdeconv::from_toml_file(path).expect("error loading game configuration file")
    }

    #[inline]
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(1_000_000_000 / self.server.tick_hz as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.server.tick_hz, 20);
        assert_eq!(cfg.game.move_cooldown_ms, 330);
        assert_eq!(cfg.game.turn_cooldown_ms, 200);
        assert_eq!(cfg.game.view_range, 10);
        assert_eq!(cfg.game.handshake_timeout_secs, 5);
    }

    #[test]
    fn tick_period_is_50ms_at_20hz() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.tick_period(), std::time::Duration::from_millis(50));
    }
}
