//! Frame header constants plus the `Reader`/`Writer` cursors used to build and parse payloads.
//!
//! Mirrors the manual-serialization discipline the rest of the stack already uses (see
//! `flux::time` for the only other hand-rolled wire primitive): no `serde`, no allocation per
//! primitive, explicit big-endian byte order throughout.

use byteorder::{BigEndian, ByteOrder};
use std::error::Error;
use std::fmt;

/// First two bytes of every frame header.
pub const MAGIC: [u8; 2] = [0x11, 0x68];

/// Size of the frame header: two magic bytes plus a 16-bit big-endian payload length.
pub const HEADER_LEN: usize = 4;

/// Upper bound on a single payload, chosen well under the 16-bit length field's range so a
/// single oversized frame can never exhaust the per-connection read buffer.
pub const MAX_PAYLOAD: usize = 4096;

/// Errors produced while decoding a frame header or a payload's fields. These are the
/// "Framing" error kind from the error model; a `Live` connection that triggers one records a
/// protocol-violation strike rather than panicking.
#[derive(Debug, Eq, PartialEq)]
pub enum CodecError {
    /// The magic bytes at the start of the header did not match.
    BadMagic,
    /// The declared payload size was zero or exceeded `MAX_PAYLOAD`.
    BadSize(u16),
    /// A read ran past the end of the available bytes.
    Truncated,
    /// A write would not fit in the destination buffer's remaining capacity.
    Overflow,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BadMagic => write!(f, "bad frame magic"),
            CodecError::BadSize(size) => write!(f, "payload size {} out of range", size),
            CodecError::Truncated => write!(f, "truncated read"),
            CodecError::Overflow => write!(f, "write overflowed destination capacity"),
        }
    }
}

impl Error for CodecError {}

pub type CodecResult<T> = Result<T, CodecError>;

/// Validates a 4-byte frame header and returns the payload size it declares.
#[inline]
pub fn decode_header(header: [u8; HEADER_LEN]) -> CodecResult<u16> {
    if header[0] != MAGIC[0] || header[1] != MAGIC[1] {
        return Err(CodecError::BadMagic);
    }

    let size = BigEndian::read_u16(&header[2..4]);
    if size == 0 || size as usize > MAX_PAYLOAD {
        return Err(CodecError::BadSize(size));
    }

    Ok(size)
}

/// Builds the 4-byte header for a payload of the given length. Panics if `payload_len` does
/// not fit the wire contract; callers (the `Writer`) only ever pass lengths they built
/// themselves and already bounded against `MAX_PAYLOAD`.
#[inline]
pub fn encode_header(payload_len: u16) -> [u8; HEADER_LEN] {
    let mut header = [MAGIC[0], MAGIC[1], 0, 0];
    BigEndian::write_u16(&mut header[2..4], payload_len);
    header
}

/// A forward-only cursor over a byte slice. Every read advances the cursor and fails with
/// `Truncated` rather than panicking if there isn't enough data left.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    #[inline]
    pub fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn u16(&mut self) -> CodecResult<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    #[inline]
    pub fn u32(&mut self) -> CodecResult<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    #[inline]
    pub fn u64(&mut self) -> CodecResult<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    #[inline]
    pub fn i16(&mut self) -> CodecResult<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    #[inline]
    pub fn i32(&mut self) -> CodecResult<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    /// A short, 1-byte-length-prefixed UTF-8 string. Invalid UTF-8 is lossily replaced rather
    /// than failing the frame, matching the "payload is well-formed bytes, content is the
    /// handler's problem" split the error model draws between Framing and Game errors.
    #[inline]
    pub fn string_short(&mut self) -> CodecResult<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// A long, 2-byte-length-prefixed UTF-8 string.
    #[inline]
    pub fn string_long(&mut self) -> CodecResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// An append-only payload builder. Opcode plus fields go in; `finish_frame` wraps the result
/// with a validated header, ready to hand to a connection's send queue.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Starts a new payload with the given opcode as its first byte.
    #[inline]
    pub fn new(opcode: u8) -> Self {
        let mut buf = Vec::with_capacity(32);
        buf.push(opcode);
        Writer { buf }
    }

    #[inline]
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    #[inline]
    pub fn u16(&mut self, v: u16) -> &mut Self {
        let mut tmp = [0u8; 2];
        BigEndian::write_u16(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    #[inline]
    pub fn u32(&mut self, v: u32) -> &mut Self {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    #[inline]
    pub fn u64(&mut self, v: u64) -> &mut Self {
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    #[inline]
    pub fn i16(&mut self, v: i16) -> &mut Self {
        let mut tmp = [0u8; 2];
        BigEndian::write_i16(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    #[inline]
    pub fn i32(&mut self, v: i32) -> &mut Self {
        let mut tmp = [0u8; 4];
        BigEndian::write_i32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    /// Writes a short string, truncating at 255 bytes (on a UTF-8 boundary) if necessary.
    #[inline]
    pub fn string_short(&mut self, s: &str) -> &mut Self {
        let bytes = truncate_utf8(s.as_bytes(), u8::MAX as usize);
        self.u8(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes a long string, truncating at 65535 bytes (on a UTF-8 boundary) if necessary.
    #[inline]
    pub fn string_long(&mut self, s: &str) -> &mut Self {
        let bytes = truncate_utf8(s.as_bytes(), u16::MAX as usize);
        self.u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Consumes the builder, wrapping the accumulated payload with a frame header.
    ///
    /// # Panics
    /// Panics if the payload (opcode + fields) exceeds `MAX_PAYLOAD`; every packet type in
    /// `wire::opcode` is sized well under the limit, so this indicates a programming error,
    /// not attacker input.
    pub fn finish_frame(self) -> Vec<u8> {
        assert!(
            self.buf.len() <= MAX_PAYLOAD,
            "encoded payload of {} bytes exceeds MAX_PAYLOAD",
            self.buf.len()
        );
        let header = encode_header(self.buf.len() as u16);
        let mut frame = Vec::with_capacity(HEADER_LEN + self.buf.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&self.buf);
        frame
    }
}

#[inline]
fn truncate_utf8(bytes: &[u8], max: usize) -> &[u8] {
    if bytes.len() <= max {
        return bytes;
    }
    let mut end = max;
    while end > 0 && (bytes[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = encode_header(7);
        assert_eq!(decode_header(header).unwrap(), 7);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let header = [0x00, 0x00, 0x00, 0x07];
        assert_eq!(decode_header(header), Err(CodecError::BadMagic));
    }

    #[test]
    fn header_rejects_zero_size() {
        let header = encode_header_raw(0);
        assert_eq!(decode_header(header), Err(CodecError::BadSize(0)));
    }

    #[test]
    fn header_rejects_oversized() {
        let header = encode_header_raw((MAX_PAYLOAD + 1) as u16);
        assert_eq!(
            decode_header(header),
            Err(CodecError::BadSize((MAX_PAYLOAD + 1) as u16))
        );
    }

    // encode_header() asserts in-range for real callers; this helper bypasses that so the
    // above tests can exercise decode_header's own bounds check directly.
    fn encode_header_raw(size: u16) -> [u8; HEADER_LEN] {
        let mut header = [MAGIC[0], MAGIC[1], 0, 0];
        BigEndian::write_u16(&mut header[2..4], size);
        header
    }

    #[test]
    fn primitives_round_trip() {
        let mut w = Writer::new(0x01);
        w.u16(1234).u32(5678).u64(9_000_000_000).i16(-7).i32(-70000);
        w.string_short("hello");
        w.string_long("world");
        let frame = w.finish_frame();

        let size = decode_header(frame[0..4].try_into().unwrap()).unwrap();
        let payload = &frame[4..];
        assert_eq!(payload.len(), size as usize);

        let mut r = Reader::new(payload);
        assert_eq!(r.u8().unwrap(), 0x01);
        assert_eq!(r.u16().unwrap(), 1234);
        assert_eq!(r.u32().unwrap(), 5678);
        assert_eq!(r.u64().unwrap(), 9_000_000_000);
        assert_eq!(r.i16().unwrap(), -7);
        assert_eq!(r.i32().unwrap(), -70000);
        assert_eq!(r.string_short().unwrap(), "hello");
        assert_eq!(r.string_long().unwrap(), "world");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn reader_reports_truncated_on_short_input() {
        let mut r = Reader::new(&[0x00]);
        assert_eq!(r.u16(), Err(CodecError::Truncated));
    }

    #[test]
    fn long_strings_truncate_on_a_char_boundary() {
        let s: String = std::iter::repeat('é').take(200).collect();
        let mut w = Writer::new(0xF1);
        w.string_short(&s);
        let frame = w.finish_frame();
        let mut r = Reader::new(&frame[4..]);
        let _opcode = r.u8().unwrap();
        let decoded = r.string_short().unwrap();
        assert!(decoded.len() <= 255);
        assert!(std::str::from_utf8(decoded.as_bytes()).is_ok());
    }
}
