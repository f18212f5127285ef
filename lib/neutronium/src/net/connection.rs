//! A single TCP peer. Owns the pipelined frame reader, the outgoing send queue, and the
//! single-shot disconnect flag. Shared between its owning IO worker (reads/writes) and the
//! game thread (enqueueing broadcasts, driving disconnect) via `Arc<Connection>`.

use crate::identity::ConnectionId;
use crate::wire::codec::{decode_header, CodecError, HEADER_LEN};
use mio::net::TcpStream;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bounded ring size for RTT samples (see §4.3 Ping / RTT).
const PING_SAMPLE_CAP: usize = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnState {
    AwaitingHandshake = 0,
    Live = 1,
    Closing = 2,
}

impl ConnState {
    #[inline]
    fn from_u8(v: u8) -> ConnState {
        match v {
            0 => ConnState::AwaitingHandshake,
            1 => ConnState::Live,
            _ => ConnState::Closing,
        }
    }
}

/// Result of one `Connection::read_frame` attempt.
pub enum ReadOutcome {
    /// No complete frame is available yet; try again once the socket is readable.
    WouldBlock,
    /// The peer closed the socket (a zero-length read).
    Closed,
    /// One complete payload (opcode + fields, header already validated and stripped).
    Frame(Vec<u8>),
    /// The header or size failed validation; this is a Framing error (§7).
    Framing(CodecError),
}

/// Read-side accumulator for the pipelined header-then-payload read described in §4.3.
enum ReadStage {
    Header { buf: [u8; HEADER_LEN], have: usize },
    Payload { buf: Vec<u8>, have: usize },
}

impl Default for ReadStage {
    fn default() -> Self {
        ReadStage::Header {
            buf: [0u8; HEADER_LEN],
            have: 0,
        }
    }
}

pub struct Connection {
    pub id: ConnectionId,
    pub peer_ip: String,

    state: AtomicU8,
    disconnecting: AtomicBool,

    created_at: Instant,
    handshake_timeout: Duration,

    violation_count: AtomicU32,

    ping_samples: Mutex<VecDeque<u32>>,
    ping_avg_ms: AtomicU32,
    last_ping_sent: Mutex<Option<(u32, Instant)>>,

    read_stage: Mutex<ReadStage>,
    send_queue: Mutex<VecDeque<Vec<u8>>>,
    write_in_progress: AtomicBool,

    socket: Mutex<TcpStream>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer_ip: String,
        socket: TcpStream,
        handshake_timeout: Duration,
    ) -> Connection {
        Connection {
            id,
            peer_ip,
            state: AtomicU8::new(ConnState::AwaitingHandshake as u8),
            disconnecting: AtomicBool::new(false),
            created_at: Instant::now(),
            handshake_timeout,
            violation_count: AtomicU32::new(0),
            ping_samples: Mutex::new(VecDeque::with_capacity(PING_SAMPLE_CAP)),
            ping_avg_ms: AtomicU32::new(0),
            last_ping_sent: Mutex::new(None),
            read_stage: Mutex::new(ReadStage::default()),
            send_queue: Mutex::new(VecDeque::new()),
            write_in_progress: AtomicBool::new(false),
            socket: Mutex::new(socket),
        }
    }

    #[inline]
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.state() == ConnState::Live
    }

    /// True once `handshake_timeout` has elapsed without reaching `Live`. Callers only need to
    /// check this while `state() == AwaitingHandshake`.
    #[inline]
    pub fn handshake_expired(&self) -> bool {
        self.created_at.elapsed() >= self.handshake_timeout
    }

    /// Records one protocol violation and returns the new count. The caller (dispatcher /
    /// read loop) compares this against `MAX_HEADER_VIOLATIONS` to decide on disconnect.
    #[inline]
    pub fn record_violation(&self) -> u32 {
        self.violation_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Compare-and-set single-shot disconnect gate. Returns `true` exactly once across the
    /// lifetime of this connection — that caller runs the cleanup body; everyone else returns
    /// immediately (§4.3 Disconnect, single-shot).
    #[inline]
    pub fn begin_disconnect(&self) -> bool {
        self.disconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Shuts down both halves of the socket and marks the connection `Closing`. Idempotent at
    /// the OS level (a second `shutdown` on an already-shut-down socket just errors, which we
    /// ignore); callers should still only reach here once via `begin_disconnect`.
    pub fn close_socket(&self) {
        self.set_state(ConnState::Closing);
        if let Ok(socket) = self.socket.lock() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    /// Appends a fully framed packet to the send queue. Safe to call from any thread; the
    /// owning IO worker drains it via `flush_send_queue`. The queue is intentionally unbounded
    /// today (documented open issue, §9 — send-queue back-pressure).
    pub fn enqueue(&self, frame: Vec<u8>) {
        let mut queue = self.send_queue.lock().expect("send queue poisoned");
        queue.push_back(frame);
    }

    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        !self.send_queue.lock().expect("send queue poisoned").is_empty()
    }

    /// Drains as much of the send queue as the socket will currently accept. A single write is
    /// in flight at a time: a partially-written frame is pushed back to the front of the queue
    /// and `write_in_progress` stays set so the next readiness event resumes it.
    pub fn flush_send_queue(&self) -> io::Result<()> {
        let mut queue = self.send_queue.lock().expect("send queue poisoned");
        let mut socket = self.socket.lock().expect("socket poisoned");

        while let Some(mut frame) = queue.pop_front() {
            self.write_in_progress.store(true, Ordering::Relaxed);
            match socket.write(&frame) {
                Ok(written) if written == frame.len() => continue,
                Ok(written) => {
                    frame.drain(0..written);
                    queue.push_front(frame);
                    return Ok(());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    queue.push_front(frame);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        self.write_in_progress.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Attempts to read and assemble one complete frame, pipelining the 4-byte header and the
    /// declared payload length as described in §4.3. May consume several `read()` calls to
    /// fill the header and then the payload; each call advances whatever stage is in progress.
    pub fn read_frame(&self) -> ReadOutcome {
        let mut stage = self.read_stage.lock().expect("read stage poisoned");
        let mut socket = self.socket.lock().expect("socket poisoned");

        loop {
            match &mut *stage {
                ReadStage::Header { buf, have } => {
                    match socket.read(&mut buf[*have..]) {
                        Ok(0) => return ReadOutcome::Closed,
                        Ok(n) => {
                            *have += n;
                            if *have < HEADER_LEN {
                                return ReadOutcome::WouldBlock;
                            }
                            match decode_header(*buf) {
                                Ok(size) => {
                                    *stage = ReadStage::Payload {
                                        buf: vec![0u8; size as usize],
                                        have: 0,
                                    };
                                }
                                Err(err) => {
                                    *stage = ReadStage::default();
                                    return ReadOutcome::Framing(err);
                                }
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return ReadOutcome::WouldBlock
                        }
                        Err(_) => return ReadOutcome::Closed,
                    }
                }
                ReadStage::Payload { buf, have } => {
                    match socket.read(&mut buf[*have..]) {
                        Ok(0) => return ReadOutcome::Closed,
                        Ok(n) => {
                            *have += n;
                            if *have < buf.len() {
                                return ReadOutcome::WouldBlock;
                            }
                            let payload = std::mem::take(buf);
                            *stage = ReadStage::default();
                            return ReadOutcome::Frame(payload);
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return ReadOutcome::WouldBlock
                        }
                        Err(_) => return ReadOutcome::Closed,
                    }
                }
            }
        }
    }

    /// Arms the ping timer, recording the timestamp the server put on the outgoing
    /// `S_Ping_Request` so the matching pong can be turned into an RTT sample.
    pub fn note_ping_sent(&self, ts: u32) {
        *self.last_ping_sent.lock().expect("ping state poisoned") = Some((ts, Instant::now()));
    }

    /// Consumes a pong echoing `ts` and, if it matches the outstanding ping, records an RTT
    /// sample. Mismatched or stray pongs are ignored rather than treated as a violation — a
    /// client echoing a stale timestamp is a quality-of-RTT-measurement problem, not a
    /// protocol one.
    pub fn record_pong(&self, ts: u32) {
        let mut last = self.last_ping_sent.lock().expect("ping state poisoned");
        if let Some((sent_ts, sent_at)) = *last {
            if sent_ts == ts {
                let rtt_ms = sent_at.elapsed().as_millis() as u32;
                self.push_ping_sample(rtt_ms);
                *last = None;
            }
        }
    }

    fn push_ping_sample(&self, rtt_ms: u32) {
        let mut samples = self.ping_samples.lock().expect("ping samples poisoned");
        if samples.len() == PING_SAMPLE_CAP {
            samples.pop_front();
        }
        samples.push_back(rtt_ms);
        let avg = (samples.iter().sum::<u32>()) / samples.len() as u32;
        self.ping_avg_ms.store(avg, Ordering::Relaxed);
    }

    /// Published running average RTT in milliseconds across the last (up to) 5 samples.
    #[inline]
    pub fn ping_avg_ms(&self) -> u32 {
        self.ping_avg_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream as StdTcpStream};

    fn pair() -> (Connection, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let server = TcpStream::from_std(server);
        let conn = Connection::new(
            ConnectionId::new(1),
            "127.0.0.1".to_string(),
            server,
            Duration::from_secs(5),
        );
        (conn, client)
    }

    #[test]
    fn starts_awaiting_handshake() {
        let (conn, _client) = pair();
        assert_eq!(conn.state(), ConnState::AwaitingHandshake);
        assert!(!conn.is_live());
    }

    #[test]
    fn disconnect_gate_fires_once() {
        let (conn, _client) = pair();
        assert!(conn.begin_disconnect());
        assert!(!conn.begin_disconnect());
    }

    #[test]
    fn ping_sample_recorded_on_matching_pong() {
        let (conn, _client) = pair();
        conn.note_ping_sent(1234);
        conn.record_pong(1234);
        // One sample recorded; average is some non-negative value (likely 0ms in-process).
        let _ = conn.ping_avg_ms();
        let remaining = conn.last_ping_sent.lock().unwrap();
        assert!(remaining.is_none());
    }

    #[test]
    fn mismatched_pong_is_ignored() {
        let (conn, _client) = pair();
        conn.note_ping_sent(1234);
        conn.record_pong(9999);
        let remaining = conn.last_ping_sent.lock().unwrap();
        assert!(remaining.is_some());
    }

    #[test]
    fn read_frame_assembles_header_then_payload() {
        use std::io::Write as _;
        let (conn, mut client) = pair();
        // 0x11 0x68 header, size=2, payload = [0x01, 0x02]
        client.write_all(&[0x11, 0x68, 0x00, 0x02, 0x01, 0x02]).unwrap();
        client.flush().unwrap();

        // Give the OS a moment to deliver bytes; loop a few times tolerating WouldBlock.
        for _ in 0..100 {
            match conn.read_frame() {
                ReadOutcome::Frame(payload) => {
                    assert_eq!(payload, vec![0x01, 0x02]);
                    return;
                }
                ReadOutcome::WouldBlock => std::thread::sleep(Duration::from_millis(5)),
                ReadOutcome::Closed => panic!("unexpected close"),
                ReadOutcome::Framing(e) => panic!("unexpected framing error: {:?}", e),
            }
        }
        panic!("frame never assembled");
    }

    #[test]
    fn read_frame_reports_bad_magic() {
        use std::io::Write as _;
        let (conn, mut client) = pair();
        client.write_all(&[0x00, 0x00, 0x00, 0x02, 0x01, 0x02]).unwrap();
        client.flush().unwrap();

        for _ in 0..100 {
            match conn.read_frame() {
                ReadOutcome::Framing(CodecError::BadMagic) => return,
                ReadOutcome::WouldBlock => std::thread::sleep(Duration::from_millis(5)),
                other => match other {
                    ReadOutcome::Closed => panic!("unexpected close"),
                    ReadOutcome::Frame(_) => panic!("unexpected full frame"),
                    ReadOutcome::Framing(e) => panic!("unexpected error kind: {:?}", e),
                    ReadOutcome::WouldBlock => unreachable!(),
                },
            }
        }
        panic!("framing error never observed");
    }
}
