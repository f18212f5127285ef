use clap::{App, Arg};
use flux::logging::{self, info, o};
use gamecore::config::GameConfig;
use gamecore::ratelimit::RateLimiter;
use gamecore::{accept, gameloop, GameSettings};
use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 4;

fn main() {
    let matches = App::new("Game Server")
        .version("0.1.0")
        .author("Bush Hammer Industries")
        .about("Runs the tile-world game server.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the TOML config file; built-in defaults are used if omitted")
                .required(false),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .takes_value(true)
                .help("Number of IO worker threads (default 4)"),
        )
        .get_matches();

    let mut config = match matches.value_of("CONFIG_FILE") {
        Some(path) => GameConfig::load(path),
        None => GameConfig::default(),
    };

    if let Ok(addr) = env::var("GAMERUNNER_LISTEN_ADDR") {
        config.server.address = addr;
    }

    let log_level = env::var("GAMERUNNER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let logger = logging::init(&log_level);

    let worker_count: usize = matches
        .value_of("workers")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WORKERS);

    info!(logger, "starting game server";
        "address" => &config.server.address,
        "tick_hz" => config.server.tick_hz,
        "workers" => worker_count,
    );

    let settings = GameSettings::from(&config);
    let tick_period = config.tick_period();
    let handshake_timeout = Duration::from_secs(config.game.handshake_timeout_secs);
    let map_width = config.game.map_width;
    let map_height = config.game.map_height;

    let rate_limiter = RateLimiter::new(config.rate_limit.clone());
    let shared = Arc::new(gameloop::Shared::new(rate_limiter));
    let running = Arc::new(AtomicBool::new(true));

    let shutdown_running = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_running.store(false, Ordering::Release);
    }) {
        eprintln!("failed to install shutdown handler: {}", e);
        process::exit(1);
    }

    let worker_handles = match accept::spawn(
        &config.server.address,
        worker_count,
        shared.clone(),
        settings,
        handshake_timeout,
        logger.new(o!("role" => "io")),
        running.clone(),
    ) {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("failed to start IO worker pool: {}", e);
            process::exit(1);
        }
    };

    gameloop::run(
        shared.clone(),
        settings,
        tick_period,
        map_width,
        map_height,
        running.clone(),
        logger.new(o!("role" => "game")),
    );

    info!(logger, "shutting down");
    shared.connections.close_all();

    for handle in worker_handles {
        let _ = handle.join();
    }
}
