//! Validation of incoming frame headers against the rules of RFC 6455 and the state of the
//! connection.
use std::fmt;

use crate::{
    frame::{Header, OpCode, MAX_CONTROL_PAYLOAD},
    ProtocolError,
};

/// The role of the local endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    #[inline]
    pub fn is_client(&self) -> bool {
        matches!(self, Side::Client)
    }

    #[inline]
    pub fn is_server(&self) -> bool {
        matches!(self, Side::Server)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Server => f.write_str("server"),
        }
    }
}

/// What the reading side knows about the connection when a header arrives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct State {
    /// The local role, deciding which masking is expected from the peer.
    pub side: Side,
    /// `true` between the first and the final frame of a fragmented data message.
    pub fragmented: bool,
}

impl State {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            fragmented: false,
        }
    }

    pub fn client() -> Self {
        Self::new(Side::Client)
    }

    pub fn server() -> Self {
        Self::new(Side::Server)
    }

    /// Returns the state with the fragmentation flag set.
    pub fn fragmented(self) -> Self {
        Self {
            fragmented: true,
            ..self
        }
    }

    #[inline]
    pub fn is_client(&self) -> bool {
        self.side.is_client()
    }

    #[inline]
    pub fn is_server(&self) -> bool {
        self.side.is_server()
    }

    #[inline]
    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }
}

/// Checks whether a received header may be accepted in `state`.
///
/// The rules are checked in order, the first violation is reported:
///
/// 1. No reserved bit is set, as no extension is negotiated.
/// 2. The opcode is not reserved.
/// 3. A control frame is final and carries at most 125 bytes.
/// 4. A server only receives masked frames, and a client only unmasked ones.
/// 5. A continuation frame only arrives inside a fragmented message, and a new text or binary
///    frame only outside of one.
pub fn check_header(header: &Header, state: State) -> Result<(), ProtocolError> {
    if header.has_rsv() {
        return Err(ProtocolError::ReservedBitsSet);
    }

    if let OpCode::Reserved(code) = header.opcode {
        return Err(ProtocolError::UnknownOpCode(code));
    }

    if header.opcode.is_control() && (!header.fin || header.length > MAX_CONTROL_PAYLOAD as u64) {
        return Err(ProtocolError::ControlFrameInvalid);
    }

    match (state.side, header.is_masked()) {
        (Side::Server, false) => return Err(ProtocolError::MaskRequired),
        (Side::Client, true) => return Err(ProtocolError::MaskUnexpected),
        _ => {}
    }

    match header.opcode {
        OpCode::Continuation if !state.fragmented => Err(ProtocolError::UnexpectedContinuation),
        OpCode::Text | OpCode::Binary if state.fragmented => {
            Err(ProtocolError::UnexpectedContinuation)
        }
        _ => Ok(()),
    }
}
