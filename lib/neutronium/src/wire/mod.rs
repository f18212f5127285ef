//! The framed binary wire protocol: `[0x11][0x68][size_hi][size_lo][payload]`.
//!
//! `codec` provides pure, allocation-light encode/decode primitives over big-endian integers
//! and length-prefixed strings. `opcode` names the packet catalogue and the client/server
//! direction discipline the dispatcher enforces.

pub mod codec;
pub mod opcode;
pub mod packet;

pub use codec::{CodecError, Reader, Writer, HEADER_LEN, MAGIC, MAX_PAYLOAD};
pub use opcode::{Direction, Opcode};
