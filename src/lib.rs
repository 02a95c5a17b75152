//! # wswire
//! Streaming implementation of the WebSocket wire protocol (RFC 6455): frame header encoding and
//! decoding, payload masking, message fragmentation, incremental UTF-8 validation of text messages
//! and the control frame sub-protocol including the closing handshake.
//!
//! The crate works on any byte stream that already speaks the WebSocket protocol. The HTTP upgrade,
//! the transport and the connection lifecycle are left to the caller: hand a [`Reader`] the inbound
//! half and a [`Writer`] the outbound half, tagged with the [`Side`] of the connection.
//!
//! # Features
//! The crate provides optional features that can be enabled in your `Cargo.toml`:
//!
//! - `logging`: Enables trace and debug logging of frame processing and of the closing handshake
//!   using the `log` crate.
//!
//! - `simd`: Validates UTF-8 text payloads with `simdutf8`.
//!
//! ## Usage Example
//! ```toml
//! [dependencies]
//! wswire = { version = "0.1", features = ["logging"] }
//! ```
//!
//! # Reading
//! The [`Reader`] never buffers a whole message. [`Reader::next_frame`] advances to the next frame
//! header and [`Reader::read`] streams the payload of the current message, moving across
//! continuation frames on its own. Control frames that arrive in between are handed to an
//! [`Intermediate`] hook, typically a [`ControlHandler`] that answers pings and close frames.
//!
//! ```rust
//! use std::io::Cursor;
//! use wswire::{frame::{write_frame, Frame}, OpCode, Reader, Side};
//!
//! # fn main() -> wswire::Result<()> {
//! let mut wire = Vec::new();
//! write_frame(&mut wire, &Frame::new(false, OpCode::Text, "Hello, "))?;
//! write_frame(&mut wire, &Frame::ping("are you there?"))?;
//! write_frame(&mut wire, &Frame::new(true, OpCode::Continuation, "World!"))?;
//!
//! let mut reader = Reader::new(Cursor::new(wire), Side::Client).with_utf8();
//! let header = reader.next_frame()?;
//! assert_eq!(header.opcode, OpCode::Text);
//!
//! let mut payload = Vec::new();
//! reader.read_all(&mut payload)?;
//! assert_eq!(payload, b"Hello, World!");
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//! The [`Writer`] buffers a logical message and emits it as one frame, or as several fragments
//! once the configured fragment size is reached. Frames written from the client side are masked.
//!
//! ```rust
//! use wswire::{OpCode, Side, Writer};
//!
//! # fn main() -> wswire::Result<()> {
//! let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Text).with_fragment_size(5);
//! writer.write(b"fragmented payload")?;
//! writer.flush()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod check;
pub mod close;
pub mod codec;
pub mod control;
pub mod frame;
pub mod helper;
pub mod mask;
pub mod options;
pub mod reader;
mod utf8;
pub mod writer;

use std::io;

use thiserror::Error;

pub use check::{check_header, Side, State};
pub use close::{CloseCode, CloseFrame};
pub use control::{ClosedError, ControlHandler};
pub use frame::{Frame, Header, OpCode};
pub use options::Options;
pub use reader::{Intermediate, ReadState, Reader};
pub use writer::Writer;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Represents errors that can occur while processing the WebSocket wire protocol.
///
/// The errors are broadly categorized into:
///
/// - Protocol violations committed by the peer ([`ProtocolError`]). These are fatal and are
///   answered with a close frame carrying [`CloseCode::Protocol`].
/// - Short reads, where the transport gave fewer bytes than a declared structure needs.
/// - Policy limits, such as [`WebSocketError::FrameTooLarge`].
/// - The graceful end of the connection, signalled by [`WebSocketError::Closed`].
/// - Misuse of the API and I/O errors from the underlying transport.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// The peer violated the protocol. See [`ProtocolError`] for the individual rules.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The stream ended in the middle of a frame header, or the header declares a payload length
    /// with the most significant bit set.
    #[error("Malformed frame header")]
    MalformedHeader,

    /// The stream ended cleanly at a frame boundary, before any byte of the next header.
    #[error("End of stream")]
    EndOfStream,

    /// The stream ended inside a frame payload, or between the fragments of a message.
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The declared payload length of a frame exceeds the configured maximum frame size.
    /// No byte of the payload has been consumed when this error is returned.
    #[error("Frame too large: {length} bytes (max: {max})")]
    FrameTooLarge { length: u64, max: u64 },

    /// A payload read was attempted before a call to [`Reader::next_frame`] advanced the
    /// reader onto a frame.
    #[error("No frame advance")]
    NoFrameAdvance,

    /// A [`ControlHandler`] was asked to handle a frame that is not a close, ping or pong frame.
    #[error("Not a control frame")]
    NotControlFrame,

    /// The peer closed the connection. This is the normal termination signal of a connection,
    /// not a failure.
    #[error(transparent)]
    Closed(#[from] ClosedError),

    /// Wraps standard I/O errors from the underlying transport, such as connection resets.
    #[error(transparent)]
    IoError(io::Error),
}

/// Violations of the framing rules of RFC 6455.
///
/// The `Display` output of each variant is short enough to be used as the reason of a close frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Reserved bits are set while no extension was negotiated.
    #[error("non-zero rsv bits with no extension negotiated")]
    ReservedBitsSet,

    /// A control frame is fragmented or carries more than 125 bytes of payload.
    #[error("control frame is fragmented or too large")]
    ControlFrameInvalid,

    /// The frame uses one of the reserved opcodes (0x3-0x7 or 0xB-0xF).
    #[error("use of reserved op code {0:#x}")]
    UnknownOpCode(u8),

    /// A continuation frame arrived outside of a fragmented message, or a new text or binary frame
    /// arrived before the previous fragmented message was finished.
    #[error("unexpected frame in fragmentation sequence")]
    UnexpectedContinuation,

    /// A frame sent from the client to the server is not masked.
    #[error("frames from client to server must be masked")]
    MaskRequired,

    /// A frame sent from the server to the client is masked.
    #[error("frames from server to client must be not masked")]
    MaskUnexpected,

    /// A text message or a close reason is not valid UTF-8.
    #[error("invalid utf8 sequence")]
    InvalidUtf8,

    /// A close frame carries a single byte of payload.
    #[error("close frame payload is too short")]
    CloseFrameTooShort,

    /// The close status code is outside of the ranges in use (below 1000 or above 4999).
    #[error("status code {0} is not in use")]
    StatusCodeNotInUse(u16),

    /// The close status code 1004 is reserved without a meaning.
    #[error("status code {0} has no meaning yet")]
    StatusCodeNoMeaning(u16),

    /// The close status code is reserved for local use and must never be sent on the wire.
    #[error("status code {0} must not be sent")]
    StatusCodeReserved(u16),

    /// The close status code lies in the protocol range but is not defined.
    #[error("status code {0} is not defined")]
    StatusCodeUnknown(u16),
}

impl From<io::Error> for WebSocketError {
    fn from(err: io::Error) -> Self {
        match err.downcast::<WebSocketError>() {
            Ok(err) => err,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Self::UnexpectedEndOfStream,
            Err(err) => Self::IoError(err),
        }
    }
}

impl From<WebSocketError> for io::Error {
    fn from(err: WebSocketError) -> Self {
        match err {
            WebSocketError::IoError(err) => err,
            WebSocketError::UnexpectedEndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            err => io::Error::other(err),
        }
    }
}
