//! Per-IP admission control (§4.2): ban list, sliding-window rate limit, concurrency cap, and
//! protocol-failure strikes that escalate into a ban. Styled after the authenticator service's
//! `Ban`/`UserInfo` bookkeeping in the teacher repo — in-process mutex-protected maps, lazily
//! swept, no background sweeper thread.

use crate::config::RateLimit;
use hashbrown::HashMap;
use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Eq, PartialEq)]
pub enum AdmissionError {
    Banned,
    RateLimited,
    ConcurrencyExhausted,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Banned => write!(f, "peer IP is banned"),
            AdmissionError::RateLimited => write!(f, "peer IP exceeded the connection rate"),
            AdmissionError::ConcurrencyExhausted => write!(f, "peer IP is at its concurrent-connection cap"),
        }
    }
}

impl Error for AdmissionError {}

struct IpState {
    ban_until: Option<Instant>,
    attempts: Vec<Instant>,
    active: u32,
    strikes: u32,
}

impl IpState {
    fn new() -> IpState {
        IpState {
            ban_until: None,
            attempts: Vec::new(),
            active: 0,
            strikes: 0,
        }
    }
}

pub struct RateLimiter {
    cfg: RateLimit,
    state: Mutex<HashMap<IpAddr, IpState>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimit) -> RateLimiter {
        RateLimiter {
            cfg,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Runs ban check, sliding-window rate check, then concurrency cap, in that order (§4.2).
    /// On success increments the active-connection count; callers must eventually call
    /// `release` exactly once for every successful `check_admission`.
    pub fn check_admission(&self, ip: IpAddr, now: Instant) -> Result<(), AdmissionError> {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        let entry = state.entry(ip).or_insert_with(IpState::new);

        if let Some(until) = entry.ban_until {
            if now < until {
                return Err(AdmissionError::Banned);
            }
            entry.ban_until = None;
        }

        let window = Duration::from_secs(self.cfg.rate_window_secs);
        entry.attempts.retain(|&at| now.duration_since(at) < window);
        if entry.attempts.len() as u32 >= self.cfg.rate_max {
            return Err(AdmissionError::RateLimited);
        }

        if entry.active >= self.cfg.per_ip_cap {
            return Err(AdmissionError::ConcurrencyExhausted);
        }

        entry.attempts.push(now);
        entry.active += 1;
        Ok(())
    }

    /// Releases one concurrency slot for `ip`. Idempotent at the data-structure level (saturates
    /// at zero) though callers should still only call it once per admitted connection — that
    /// discipline is enforced by the connection's own single-shot disconnect flag, not here.
    pub fn release(&self, ip: IpAddr) {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        if let Some(entry) = state.get_mut(&ip) {
            entry.active = entry.active.saturating_sub(1);
        }
    }

    /// Records one protocol/handshake failure for `ip`; once strikes exceed
    /// `strike_threshold`, the IP is banned for `ban_duration_secs`.
    pub fn record_strike(&self, ip: IpAddr, now: Instant) {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        let entry = state.entry(ip).or_insert_with(IpState::new);
        entry.strikes += 1;
        if entry.strikes > self.cfg.strike_threshold {
            entry.ban_until = Some(now + Duration::from_secs(self.cfg.ban_duration_secs));
        }
    }

    pub fn is_banned(&self, ip: IpAddr, now: Instant) -> bool {
        let state = self.state.lock().expect("rate limiter poisoned");
        matches!(state.get(&ip), Some(entry) if entry.ban_until.map(|u| now < u).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cfg() -> RateLimit {
        RateLimit {
            rate_window_secs: 60,
            rate_max: 2,
            per_ip_cap: 1,
            strike_threshold: 2,
            ban_duration_secs: 300,
        }
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn concurrency_cap_rejects_second_concurrent_connection() {
        let limiter = RateLimiter::new(cfg());
        let now = Instant::now();
        assert!(limiter.check_admission(ip(), now).is_ok());
        assert_eq!(limiter.check_admission(ip(), now), Err(AdmissionError::ConcurrencyExhausted));
    }

    #[test]
    fn release_frees_the_concurrency_slot() {
        let limiter = RateLimiter::new(cfg());
        let now = Instant::now();
        limiter.check_admission(ip(), now).unwrap();
        limiter.release(ip());
        assert!(limiter.check_admission(ip(), now).is_ok());
    }

    #[test]
    fn strikes_escalate_to_a_ban() {
        let limiter = RateLimiter::new(cfg());
        let now = Instant::now();
        limiter.record_strike(ip(), now);
        limiter.record_strike(ip(), now);
        limiter.record_strike(ip(), now);
        assert!(limiter.is_banned(ip(), now));
        assert_eq!(limiter.check_admission(ip(), now), Err(AdmissionError::Banned));
    }

    #[test]
    fn rate_limit_rejects_after_rate_max_attempts_within_window() {
        let limiter = RateLimiter::new(cfg());
        let now = Instant::now();
        limiter.check_admission(ip(), now).unwrap();
        limiter.release(ip());
        limiter.check_admission(ip(), now).unwrap();
        limiter.release(ip());
        assert_eq!(limiter.check_admission(ip(), now), Err(AdmissionError::RateLimited));
    }
}
