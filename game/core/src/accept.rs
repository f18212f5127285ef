//! The IO worker pool (§4.3, §5): one accept thread admits and round-robins sockets, N worker
//! threads each run their own edge-triggered `mio::Poll` over a disjoint slice of connections,
//! driving the handshake state machine and, once a connection is `Live`, the packet dispatcher.

use flux::logging::{debug, info, o, warn, Logger};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use neutronium::net::{ConnState, Connection, ReadOutcome};
use neutronium::wire::codec::{CodecError, Reader};
use neutronium::wire::opcode::Opcode;
use neutronium::wire::packet;
use hashbrown::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatcher::{self, ProtocolError};
use crate::effects::Effect;
use crate::gameloop::{post_login, Shared};
use crate::GameSettings;

const WAKE_TOKEN: Token = Token(usize::MAX);

struct Handoff {
    tx: Sender<(TcpStream, String)>,
    waker: Arc<Waker>,
}

/// Spawns the accept thread plus `worker_count` IO worker threads; returns all their join
/// handles so the caller (the binary's `main`) can join them at shutdown.
pub fn spawn(
    listen_addr: &str,
    worker_count: usize,
    shared: Arc<Shared>,
    settings: GameSettings,
    handshake_timeout: Duration,
    logger: Logger,
    running: Arc<AtomicBool>,
) -> io::Result<Vec<JoinHandle<()>>> {
    let mut handoffs = Vec::with_capacity(worker_count);
    let mut handles = Vec::with_capacity(worker_count + 1);

    for idx in 0..worker_count.max(1) {
        let (tx, rx) = mpsc::channel();
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        handoffs.push(Handoff { tx, waker: waker.clone() });

        let shared = shared.clone();
        let settings = settings;
        let logger = logger.new(o!("worker" => idx));
        let running = running.clone();
        handles.push(thread::spawn(move || {
            worker_loop(poll, rx, shared, settings, handshake_timeout, logger, running);
        }));
    }

    let addr: SocketAddr = listen_addr.parse().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{}", e)))?;
    let accept_logger = logger.new(o!("role" => "accept"));
    let accept_shared = shared;
    let accept_running = running;
    handles.push(thread::spawn(move || {
        if let Err(e) = accept_loop(addr, handoffs, accept_shared, accept_logger.clone(), accept_running) {
            warn!(accept_logger, "accept loop exited with error"; "error" => format!("{}", e));
        }
    }));

    Ok(handles)
}

fn accept_loop(
    addr: SocketAddr,
    handoffs: Vec<Handoff>,
    shared: Arc<Shared>,
    logger: Logger,
    running: Arc<AtomicBool>,
) -> io::Result<()> {
    let mut listener = TcpListener::bind(addr)?;
    let mut poll = Poll::new()?;
    poll.registry().register(&mut listener, Token(0), Interest::READABLE)?;
    let mut events = Events::with_capacity(256);
    let mut next_worker = 0usize;

    info!(logger, "accept loop listening"; "address" => addr.to_string());

    while running.load(Ordering::Acquire) {
        match poll.poll(&mut events, Some(Duration::from_millis(250))) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        for event in events.iter() {
            if event.token() != Token(0) {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => admit(&shared, &handoffs, &mut next_worker, stream, peer, &logger),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!(logger, "accept() failed"; "error" => format!("{}", e));
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn admit(
    shared: &Arc<Shared>,
    handoffs: &[Handoff],
    next_worker: &mut usize,
    stream: TcpStream,
    peer: SocketAddr,
    logger: &Logger,
) {
    let ip = peer.ip();
    match shared.rate_limiter.check_admission(ip, std::time::Instant::now()) {
        Ok(()) => {
            let idx = *next_worker % handoffs.len().max(1);
            *next_worker = next_worker.wrapping_add(1);
            let handoff = &handoffs[idx];
            if handoff.tx.send((stream, ip.to_string())).is_ok() {
                let _ = handoff.waker.wake();
            }
        }
        Err(reason) => {
            debug!(logger, "admission rejected"; "peer" => peer.to_string(), "reason" => format!("{}", reason));
        }
    }
}

struct Slot {
    conn: Arc<Connection>,
}

fn worker_loop(
    mut poll: Poll,
    rx: Receiver<(TcpStream, String)>,
    shared: Arc<Shared>,
    settings: GameSettings,
    handshake_timeout: Duration,
    logger: Logger,
    running: Arc<AtomicBool>,
) {
    let mut events = Events::with_capacity(256);
    let mut conns: HashMap<Token, Slot> = HashMap::new();
    let mut next_token = 1usize;

    while running.load(Ordering::Acquire) {
        match poll.poll(&mut events, Some(Duration::from_millis(200))) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(logger, "worker poll failed"; "error" => format!("{}", e));
                break;
            }
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                drain_handoffs(&mut poll, &rx, &mut conns, &mut next_token, &shared, handshake_timeout, &logger);
                continue;
            }

            let token = event.token();
            let Some(slot) = conns.get(&token) else { continue };
            let conn = slot.conn.clone();

            if event.is_writable() && conn.flush_send_queue().is_err() {
                teardown(&conn, &shared, None);
            }

            if conn.state() != ConnState::Closing && event.is_readable() {
                service_reads(&conn, &shared, settings, &logger);
            }

            if conn.state() == ConnState::Closing {
                conns.remove(&token);
            }
        }

        sweep_handshake_timeouts(&mut conns, &shared, &logger);
    }
}

fn drain_handoffs(
    poll: &mut Poll,
    rx: &Receiver<(TcpStream, String)>,
    conns: &mut HashMap<Token, Slot>,
    next_token: &mut usize,
    shared: &Arc<Shared>,
    handshake_timeout: Duration,
    logger: &Logger,
) {
    loop {
        match rx.try_recv() {
            Ok((mut stream, peer_ip)) => {
                let token = Token(*next_token);
                *next_token += 1;
                if let Err(e) = poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE) {
                    warn!(logger, "failed to register new connection"; "error" => format!("{}", e));
                    shared.rate_limiter.release(peer_ip.parse().unwrap_or_else(|_| "0.0.0.0".parse().unwrap()));
                    continue;
                }
                let conn_id = shared.conn_ids.next();
                let conn = Arc::new(Connection::new(conn_id, peer_ip, stream, handshake_timeout));
                shared.connections.insert(conn.clone());
                conns.insert(token, Slot { conn });
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
}

/// Reads every frame currently available on `conn` and routes it by connection state. Stops at
/// the first `WouldBlock` or once the connection transitions to `Closing`.
fn service_reads(conn: &Arc<Connection>, shared: &Arc<Shared>, settings: GameSettings, logger: &Logger) {
    loop {
        match conn.read_frame() {
            ReadOutcome::WouldBlock => return,
            ReadOutcome::Closed => {
                teardown(conn, shared, None);
                return;
            }
            ReadOutcome::Framing(err) => {
                handle_framing_error(conn, shared, err, settings, logger);
                if conn.state() == ConnState::Closing {
                    return;
                }
            }
            ReadOutcome::Frame(payload) => {
                if conn.state() == ConnState::AwaitingHandshake {
                    handle_handshake(conn, &payload, shared, logger);
                    if conn.state() != ConnState::Live {
                        return;
                    }
                } else {
                    match dispatcher::dispatch_live(conn, &payload, &shared.action_queue, &shared.effects, &settings, logger) {
                        Ok(()) => {}
                        Err(err) => on_protocol_error(conn, shared, err, settings, logger),
                    }
                    if conn.state() == ConnState::Closing {
                        return;
                    }
                }
            }
        }
    }
}

fn handle_handshake(conn: &Arc<Connection>, payload: &[u8], shared: &Arc<Shared>, logger: &Logger) {
    let mut reader = Reader::new(payload);
    let ok = reader
        .u8()
        .ok()
        .filter(|&op| op == Opcode::HANDSHAKE_REQUEST)
        .and_then(|_| packet::decode_handshake_request(&mut reader).ok())
        .filter(|hs| hs.version == flux::PROTOCOL_VERSION && hs.client_magic == flux::CLIENT_MAGIC);

    match ok {
        Some(_) => {
            conn.set_state(ConnState::Live);
            conn.enqueue(packet::handshake_accepted(flux::PROTOCOL_VERSION, flux::CLIENT_MAGIC));
            post_login(shared, conn.id);
        }
        None => {
            conn.enqueue(packet::handshake_rejected(0, "bad handshake"));
            if let Ok(ip) = conn.peer_ip.parse() {
                shared.rate_limiter.record_strike(ip, std::time::Instant::now());
            }
            teardown(conn, shared, None);
        }
    }
}

fn handle_framing_error(conn: &Arc<Connection>, shared: &Arc<Shared>, err: CodecError, settings: GameSettings, logger: &Logger) {
    debug!(logger, "framing error"; "connection_id" => conn.id.get(), "error" => format!("{:?}", err));
    if conn.state() == ConnState::AwaitingHandshake {
        teardown(conn, shared, None);
        return;
    }
    escalate_violation(conn, shared, settings);
}

fn on_protocol_error(conn: &Arc<Connection>, shared: &Arc<Shared>, err: ProtocolError, settings: GameSettings, logger: &Logger) {
    debug!(logger, "protocol error"; "connection_id" => conn.id.get(), "error" => format!("{}", err));
    escalate_violation(conn, shared, settings);
}

fn escalate_violation(conn: &Arc<Connection>, shared: &Arc<Shared>, settings: GameSettings) {
    if let Ok(ip) = conn.peer_ip.parse() {
        shared.rate_limiter.record_strike(ip, std::time::Instant::now());
    }
    if conn.record_violation() > settings.max_header_violations {
        teardown(conn, shared, Some("too many protocol violations".to_string()));
    }
}

/// Runs the once-only disconnect body (§4.3 "Disconnect (single-shot)"). A connection that
/// reached `Live` goes through the `EffectSink` so the game loop can run the full departure
/// broadcast and registry removal with a player possibly attached; a connection that never left
/// `AwaitingHandshake` has no player, so its cleanup (registry removal, rate-limiter release)
/// happens right here instead of round-tripping through the game thread.
fn teardown(conn: &Arc<Connection>, shared: &Arc<Shared>, reason: Option<String>) {
    let was_live = conn.is_live();
    if !conn.begin_disconnect() {
        return;
    }
    conn.close_socket();
    if was_live {
        shared.effects.push(conn.id, Effect::Departed { reason });
    } else {
        shared.connections.remove(conn.id);
        if let Ok(ip) = conn.peer_ip.parse() {
            shared.rate_limiter.release(ip);
        }
    }
}

/// The socket's fd is never explicitly deregistered from the poll when a connection closes:
/// closing it is enough — an edge-triggered poll won't refire on a dead fd, and the worst case
/// is one harmless ignored event for a token already removed from `conns`.
fn sweep_handshake_timeouts(conns: &mut HashMap<Token, Slot>, shared: &Arc<Shared>, logger: &Logger) {
    let expired: Vec<Token> = conns
        .iter()
        .filter(|(_, slot)| slot.conn.state() == ConnState::AwaitingHandshake && slot.conn.handshake_expired())
        .map(|(&token, _)| token)
        .collect();

    for token in expired {
        if let Some(slot) = conns.remove(&token) {
            debug!(logger, "handshake timed out"; "connection_id" => slot.conn.id.get());
            teardown(&slot.conn, shared, None);
        }
    }
}
