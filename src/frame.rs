//! # Frame
//!
//! The `frame` module implements WebSocket frames as defined in [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2):
//! the frame [`Header`] and its binary codec, and a whole [`Frame`] for the cases where buffering a
//! payload in memory is acceptable.
//!
//! ### Frame Binary Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! Frames come in two categories:
//!
//! - **Data Frames**: Carry application payload with:
//!   - `OpCode::Text`: UTF-8 text data
//!   - `OpCode::Binary`: Raw binary data
//!   - `OpCode::Continuation`: Continuation of a fragmented message
//! - **Control Frames**: Manage the connection with:
//!   - `OpCode::Close`: Initiates connection closure with optional status code and reason
//!   - `OpCode::Ping`: Checks connection liveness, requires a Pong response
//!   - `OpCode::Pong`: Responds to Ping frames
//!
//! The header codec is purely structural. Decoding a header never judges whether the frame is
//! acceptable on a connection, that is the job of [`check_header`](crate::check_header).
//!
//! ### Frame Construction
//!
//! ```rust
//! use wswire::{frame::Frame, CloseCode, CloseFrame, OpCode};
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let fragment = Frame::new(false, OpCode::Binary, vec![1u8, 2, 3]);
//! let ping = Frame::ping("Ping payload");
//! let close = Frame::close(Some(&CloseFrame::new(CloseCode::Normal, "Normal closure")));
//! ```
use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{close::CloseFrame, mask::apply_mask, ProtocolError, Result, WebSocketError};

/// Maximum size of an encoded frame header: 2 fixed bytes, 8 bytes of extended length and 4 bytes
/// of masking key.
pub const MAX_HEAD_SIZE: usize = 14;

/// Maximum payload length of a control frame.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// The most significant bit of a 64-bit payload length must be zero.
const MAX_PAYLOAD_LENGTH: u64 = i64::MAX as u64;

const FIN: u8 = 0x80;
const RSV1: u8 = 0x40;
const RSV2: u8 = 0x20;
const RSV3: u8 = 0x10;
const MASK: u8 = 0x80;

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// The numeric values for each OpCode are defined in [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8):
/// - Continuation = 0x0
/// - Text = 0x1
/// - Binary = 0x2
/// - Close = 0x8
/// - Ping = 0x9
/// - Pong = 0xA
///
/// The ranges 0x3-0x7 and 0xB-0xF are reserved. They decode to [`OpCode::Reserved`] so that the
/// header codec stays lossless, and are rejected by [`check_header`](crate::check_header).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// One of the reserved opcodes, holding its 4-bit value.
    Reserved(u8),
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame.
    ///
    /// Control frames have the high bit of the opcode set, reserved ones included. They cannot be
    /// fragmented and carry at most 125 bytes of payload.
    #[inline]
    pub fn is_control(&self) -> bool {
        u8::from(*self) & 0x8 != 0
    }

    /// Returns `true` for `Continuation`, `Text` and `Binary`.
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }

    /// Returns `true` for the opcodes reserved for future use.
    #[inline]
    pub fn is_reserved(&self) -> bool {
        matches!(self, OpCode::Reserved(_))
    }
}

impl From<u8> for OpCode {
    /// Decodes the low 4 bits of `value`.
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            code => Self::Reserved(code),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(code) => code & 0x0F,
        }
    }
}

/// The metadata of a single frame.
///
/// `length` is the payload length declared on the wire, and `mask` the masking key if the MASK
/// bit is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub length: u64,
}

impl Header {
    /// Creates an unmasked header with no reserved bits set.
    pub fn new(fin: bool, opcode: OpCode, length: u64) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            length,
        }
    }

    /// Sets the masking key.
    pub fn with_mask(self, mask: [u8; 4]) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    #[inline]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Returns `true` if any of the reserved bits is set.
    #[inline]
    pub fn has_rsv(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Number of bytes the header occupies on the wire.
    pub fn size(&self) -> usize {
        let length = if self.length < 126 {
            0
        } else if self.length <= u64::from(u16::MAX) {
            2
        } else {
            8
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + length + mask
    }

    /// Decodes a header from the beginning of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not hold the whole header yet, and the header together with
    /// the number of bytes it occupies otherwise.
    ///
    /// # Errors
    /// [`WebSocketError::MalformedHeader`] if a 64-bit length has its most significant bit set.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let [b0, b1, ..] = *buf else {
            return Ok(None);
        };

        let size = encoded_size(b1);
        if buf.len() < size {
            return Ok(None);
        }

        let length = match b1 & 0x7F {
            126 => u64::from(u16::from_be_bytes([buf[2], buf[3]])),
            127 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&buf[2..10]);
                u64::from_be_bytes(bytes)
            }
            length => u64::from(length),
        };
        if length > MAX_PAYLOAD_LENGTH {
            return Err(WebSocketError::MalformedHeader);
        }

        let mask = if b1 & MASK != 0 {
            let mut key = [0u8; 4];
            key.copy_from_slice(&buf[size - 4..size]);
            Some(key)
        } else {
            None
        };

        let header = Self {
            fin: b0 & FIN != 0,
            rsv1: b0 & RSV1 != 0,
            rsv2: b0 & RSV2 != 0,
            rsv3: b0 & RSV3 != 0,
            opcode: OpCode::from(b0),
            mask,
            length,
        };

        Ok(Some((header, size)))
    }

    /// Encodes the header into `head` using the shortest length form, and returns the number of
    /// bytes written.
    ///
    /// # Errors
    /// - [`ProtocolError::ControlFrameInvalid`] for a control header that is not final or declares
    ///   more than 125 bytes.
    /// - [`WebSocketError::MalformedHeader`] if the length does not fit in 63 bits.
    pub fn encode(&self, head: &mut [u8; MAX_HEAD_SIZE]) -> Result<usize> {
        if self.opcode.is_control() && (!self.fin || self.length > MAX_CONTROL_PAYLOAD as u64) {
            return Err(ProtocolError::ControlFrameInvalid.into());
        }
        if self.length > MAX_PAYLOAD_LENGTH {
            return Err(WebSocketError::MalformedHeader);
        }

        head[0] = u8::from(self.opcode);
        for (bit, set) in [(FIN, self.fin), (RSV1, self.rsv1), (RSV2, self.rsv2), (RSV3, self.rsv3)] {
            if set {
                head[0] |= bit;
            }
        }

        let size = if self.length < 126 {
            head[1] = self.length as u8;
            2
        } else if self.length <= u64::from(u16::MAX) {
            head[1] = 126;
            head[2..4].copy_from_slice(&(self.length as u16).to_be_bytes());
            4
        } else {
            head[1] = 127;
            head[2..10].copy_from_slice(&self.length.to_be_bytes());
            10
        };

        if let Some(mask) = self.mask {
            head[1] |= MASK;
            head[size..size + 4].copy_from_slice(&mask);
            Ok(size + 4)
        } else {
            Ok(size)
        }
    }
}

/// Size of the header announced by its second byte.
#[inline]
fn encoded_size(b1: u8) -> usize {
    let length = match b1 & 0x7F {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let mask = if b1 & MASK != 0 { 4 } else { 0 };
    2 + length + mask
}

/// Reads exactly one frame header from `reader`.
///
/// # Errors
/// - [`WebSocketError::EndOfStream`] if the stream ends before the first byte of the header.
/// - [`WebSocketError::MalformedHeader`] if it ends inside the header, or the length is invalid.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Header> {
    let mut head = [0u8; MAX_HEAD_SIZE];

    match read_full(reader, &mut head[..2])? {
        0 => return Err(WebSocketError::EndOfStream),
        2 => {}
        _ => return Err(WebSocketError::MalformedHeader),
    }

    let size = encoded_size(head[1]);
    if read_full(reader, &mut head[2..size])? != size - 2 {
        return Err(WebSocketError::MalformedHeader);
    }

    match Header::parse(&head[..size])? {
        Some((header, _)) => Ok(header),
        None => Err(WebSocketError::MalformedHeader),
    }
}

/// Writes the encoded header to `writer`.
pub fn write_header<W: Write + ?Sized>(writer: &mut W, header: &Header) -> Result<()> {
    let mut head = [0u8; MAX_HEAD_SIZE];
    let size = header.encode(&mut head)?;
    writer.write_all(&head[..size])?;
    Ok(())
}

/// Reads until `buf` is full or the stream ends, returning the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// A whole frame: its header and its payload.
///
/// The payload length of the header always follows the payload on encoding, so only the flags,
/// the opcode and the masking key of `header` are relevant when building a frame by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    /// The payload, masked if `header.mask` is set.
    pub payload: BytesMut,
}

impl Frame {
    /// Creates a new unmasked frame.
    pub fn new(fin: bool, opcode: OpCode, payload: impl AsRef<[u8]>) -> Self {
        let payload = BytesMut::from(payload.as_ref());
        Self {
            header: Header::new(fin, opcode, payload.len() as u64),
            payload,
        }
    }

    /// A final text frame.
    pub fn text(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    /// A final binary frame.
    pub fn binary(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    /// A continuation of a fragmented message.
    pub fn continuation(fin: bool, payload: impl AsRef<[u8]>) -> Self {
        Self::new(fin, OpCode::Continuation, payload)
    }

    pub fn ping(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// A close frame. `None` produces an empty body.
    pub fn close(body: Option<&CloseFrame>) -> Self {
        match body {
            Some(body) => Self::close_raw(body.encode()),
            None => Self::close_raw(b""),
        }
    }

    /// A close frame with a raw payload. The payload is not validated.
    pub fn close_raw(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.header.fin
    }

    #[inline]
    pub fn is_masked(&self) -> bool {
        self.header.is_masked()
    }

    /// Checks if the frame payload is valid UTF-8.
    #[inline]
    pub fn is_utf8(&self) -> bool {
        crate::utf8::validate(&self.payload).is_some()
    }

    /// Masks the payload with a fresh random key. Does nothing if the frame is already masked.
    pub fn mask(&mut self) {
        if self.header.mask.is_none() {
            let mask: [u8; 4] = rand::random();
            apply_mask(&mut self.payload, mask, 0);
            self.header.mask = Some(mask);
        }
    }

    /// Returns the frame masked with a random key.
    pub fn masked(mut self) -> Self {
        self.mask();
        self
    }

    /// Reverses the masking of the payload and clears the key.
    pub fn unmask(&mut self) {
        if let Some(mask) = self.header.mask.take() {
            apply_mask(&mut self.payload, mask, 0);
        }
    }

    /// Encodes header and payload in one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let header = Header {
            length: self.payload.len() as u64,
            ..self.header
        };

        let mut head = [0u8; MAX_HEAD_SIZE];
        let size = header.encode(&mut head)?;

        let mut buf = BytesMut::with_capacity(size + self.payload.len());
        buf.put_slice(&head[..size]);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Reads one whole frame and unmasks its payload.
///
/// The payload buffer grows with the bytes actually received, never with the declared length
/// alone. There is no size limit though: the streaming [`Reader`](crate::Reader) is the bounded
/// alternative.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Frame> {
    let mut header = read_header(reader)?;

    let mut payload = BytesMut::new().writer();
    let read = io::copy(&mut (&mut *reader).take(header.length), &mut payload)?;
    if read < header.length {
        return Err(WebSocketError::UnexpectedEndOfStream);
    }
    let mut payload = payload.into_inner();

    if let Some(mask) = header.mask.take() {
        apply_mask(&mut payload, mask, 0);
    }

    Ok(Frame { header, payload })
}

/// Writes a whole frame with a single `write_all` call.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = frame.to_bytes()?;
    writer.write_all(&bytes)?;
    Ok(())
}
