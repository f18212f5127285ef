//! Structured logging built on `slog`. A single root `Logger` is constructed in `main` and
//! cloned (cheap, `Arc`-backed) into every subsystem that needs one; nothing here is global
//! or ambient.

pub use slog::{debug, error, info, o, trace, warn, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the root logger. `level` follows the usual `trace`/`debug`/`info`/`warn`/`error`
/// naming; anything not recognized falls back to `info`.
pub fn init(level: &str) -> Logger {
    let level = match level {
        "trace" | "debug" | "warn" | "error" => level,
        _ => "info",
    };

    let config: LoggerConfig = serdeconv::from_toml_str(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    ))
    .expect("static logger config must parse");

    config.build_logger().expect("failed to build root logger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_builds_a_usable_logger() {
        let log = init("debug");
        info!(log, "logger smoke test"; "ok" => true);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let _log = init("garbage");
    }
}
