use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("closed timelike curve, reality compromised")
        .as_secs()
}

/// Returns the current unix timestamp in milliseconds, truncated to 32 bits (wraps roughly
/// every 49 days). Used for the wire-level ping timestamp, which only needs to round-trip
/// within the lifetime of a single RTT measurement.
#[inline]
pub fn timestamp_millis_u32() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("closed timelike curve, reality compromised")
        .as_millis() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic_enough() {
        let a = timestamp_millis_u32();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = timestamp_millis_u32();
        assert!(b >= a);
    }
}
