//! The streaming frame reader.
//!
//! A [`Reader`] walks the inbound byte stream of one connection frame by frame without ever
//! buffering a whole message. It is an explicit state machine:
//!
//! ```text
//!                next_frame (data)
//! AwaitingHeader ----------------> InDataPayload --+
//!   ^    |                                         | payload of a non-final frame consumed:
//!   |    | next_frame (control, no hook)           | read() advances to the continuation
//!   |    +--------------------> InControlPayload   |
//!   +----------------------------------------------+
//! ```
//!
//! Control frames read while an [`Intermediate`] hook is installed never leave the
//! `AwaitingHeader` state: the hook consumes them inside [`Reader::next_frame`], including the
//! ones interleaved between the fragments of a data message.
use std::io::{self, Read, Write};

use crate::{
    check::{check_header, Side, State},
    control::ControlHandler,
    frame::{read_header, Header, OpCode, MAX_CONTROL_PAYLOAD},
    mask::apply_mask,
    options::Options,
    utf8::Utf8Validator,
    ProtocolError, Result, WebSocketError,
};

/// Size of the scratch buffer used by [`Reader::read_all`] and [`Reader::discard`].
const READ_CHUNK: usize = 4096;

/// A hook invoked for every control frame read by a [`Reader`].
///
/// `payload` yields exactly the unmasked payload of the frame, bytes left unread are dropped.
/// `stream` is the source of the reader, which lets a hook answer on a duplex stream.
///
/// Any error returned by the hook is returned by [`Reader::next_frame`], or by [`Reader::read`]
/// when the control frame arrived between two fragments.
pub trait Intermediate<S: ?Sized> {
    fn on_intermediate(&mut self, header: &Header, payload: &mut dyn Read, stream: &mut S)
        -> Result<()>;
}

impl<S, F> Intermediate<S> for F
where
    S: ?Sized,
    F: FnMut(&Header, &mut dyn Read) -> Result<()>,
{
    fn on_intermediate(
        &mut self,
        header: &Header,
        payload: &mut dyn Read,
        _stream: &mut S,
    ) -> Result<()> {
        self(header, payload)
    }
}

impl<S> Intermediate<S> for ControlHandler
where
    S: Write + ?Sized,
{
    fn on_intermediate(
        &mut self,
        header: &Header,
        payload: &mut dyn Read,
        stream: &mut S,
    ) -> Result<()> {
        // the reader hands out the payload already unmasked
        let header = Header {
            mask: None,
            ..*header
        };
        self.handle(&header, payload, stream)
    }
}

/// The type of a [`Reader`] without a control frame hook.
pub type NoIntermediate = fn(&Header, &mut dyn Read) -> Result<()>;

/// The observable state of a [`Reader`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadState {
    /// Between frames. The next call to [`Reader::next_frame`] reads a header.
    AwaitingHeader,
    /// Inside the payload of a data frame.
    InDataPayload,
    /// Inside the payload of a control frame exposed through [`Reader::read`].
    InControlPayload,
}

#[derive(Debug, Copy, Clone)]
enum Phase {
    AwaitingHeader,
    Data(Payload),
    Control(Payload),
}

/// Progress through the payload of the current frame.
#[derive(Debug, Copy, Clone)]
struct Payload {
    header: Header,
    pos: u64,
}

impl Payload {
    fn new(header: Header) -> Self {
        Self { header, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> u64 {
        self.header.length - self.pos
    }
}

/// Reads frames and streams message payloads from `R`.
///
/// # Example
/// ```rust
/// use std::io::{Cursor, Read};
/// use wswire::{frame::{write_frame, Frame}, OpCode, Reader, Side};
///
/// # fn main() -> wswire::Result<()> {
/// let mut wire = Vec::new();
/// write_frame(&mut wire, &Frame::new(false, OpCode::Text, "fragment1").masked())?;
/// write_frame(&mut wire, &Frame::ping("beat").masked())?;
/// write_frame(&mut wire, &Frame::new(true, OpCode::Continuation, ",fragment2").masked())?;
///
/// let mut pings = Vec::new();
/// let mut reader = Reader::new(Cursor::new(wire), Side::Server)
///     .with_callback(|_header, payload| {
///         let mut ping = Vec::new();
///         payload.read_to_end(&mut ping)?;
///         pings.push(ping);
///         Ok(())
///     });
///
/// reader.next_frame()?;
/// let mut message = Vec::new();
/// reader.read_all(&mut message)?;
/// drop(reader);
///
/// assert_eq!(message, b"fragment1,fragment2");
/// assert_eq!(pings, vec![b"beat".to_vec()]);
/// # Ok(())
/// # }
/// ```
pub struct Reader<R, I = NoIntermediate> {
    source: R,
    state: State,
    options: Options,
    intermediate: Option<I>,
    phase: Phase,
    /// Opcode of the current message.
    opcode: OpCode,
    utf8: Utf8Validator,
    /// Validate the current message as UTF-8.
    check_text: bool,
}

impl<R> Reader<R> {
    /// Creates a reader for the given side of the connection, without any control frame hook.
    pub fn new(source: R, side: Side) -> Self {
        Self::with_options(source, side, Options::default())
    }

    pub fn with_options(source: R, side: Side, options: Options) -> Self {
        Self {
            source,
            state: State::new(side),
            options,
            intermediate: None,
            phase: Phase::AwaitingHeader,
            opcode: OpCode::Continuation,
            utf8: Utf8Validator::new(),
            check_text: false,
        }
    }
}

impl<R, I> Reader<R, I> {
    /// Validates text messages as UTF-8.
    pub fn with_utf8(mut self) -> Self {
        self.options = self.options.with_utf8();
        self
    }

    /// Rejects frames declaring more than `size` bytes of payload.
    pub fn with_max_frame_size(mut self, size: u64) -> Self {
        self.options = self.options.with_max_frame_size(size);
        self
    }

    /// Installs a control frame hook, replacing any previous one.
    pub fn with_intermediate<J>(self, hook: J) -> Reader<R, J>
    where
        J: Intermediate<R>,
    {
        Reader {
            source: self.source,
            state: self.state,
            options: self.options,
            intermediate: Some(hook),
            phase: self.phase,
            opcode: self.opcode,
            utf8: self.utf8,
            check_text: self.check_text,
        }
    }

    /// Installs a closure as control frame hook.
    pub fn with_callback<F>(self, callback: F) -> Reader<R, F>
    where
        F: FnMut(&Header, &mut dyn Read) -> Result<()>,
    {
        self.with_intermediate(callback)
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Side and fragmentation state of the connection as seen by the reader.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn read_state(&self) -> ReadState {
        match self.phase {
            Phase::AwaitingHeader => ReadState::AwaitingHeader,
            Phase::Data(_) => ReadState::InDataPayload,
            Phase::Control(_) => ReadState::InControlPayload,
        }
    }

    /// Header of the frame whose payload is being read, if any.
    pub fn header(&self) -> Option<&Header> {
        match &self.phase {
            Phase::AwaitingHeader => None,
            Phase::Data(payload) | Phase::Control(payload) => Some(&payload.header),
        }
    }

    /// Opcode of the current message. Continuation frames report the opcode of the frame that
    /// started the message.
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns `true` if the bytes of the current text message read so far form complete and
    /// valid UTF-8. Always `true` when UTF-8 validation is disabled or the message is not text.
    pub fn valid_utf8(&self) -> bool {
        !self.check_text || self.utf8.is_complete()
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R, I> Reader<R, I>
where
    R: Read,
    I: Intermediate<R>,
{
    /// Advances to the next frame and returns its header.
    ///
    /// Any unread payload of the current frame is skipped first. The header is checked against
    /// the connection state and the maximum frame size before any of its payload is read.
    ///
    /// Control frames are passed to the hook when one is installed. Without a hook, a control
    /// frame between two messages is exposed through [`Reader::read`], while one arriving inside a
    /// fragmented message is dropped.
    ///
    /// # Errors
    /// - [`WebSocketError::EndOfStream`] if the stream ended cleanly between two messages.
    /// - [`WebSocketError::UnexpectedEndOfStream`] if it ended inside a frame or a fragmented
    ///   message.
    /// - [`WebSocketError::Protocol`] if the header breaks the protocol.
    /// - [`WebSocketError::FrameTooLarge`] if the frame exceeds the configured maximum.
    ///
    /// After any error the reader drops the current message. [`Reader::read`] then fails with
    /// [`WebSocketError::NoFrameAdvance`] and leaves the source untouched.
    pub fn next_frame(&mut self) -> Result<Header> {
        self.advance().inspect_err(|_| {
            // the stream can't be framed past a rejected header
            self.phase = Phase::AwaitingHeader;
            self.state.fragmented = false;
        })
    }

    fn advance(&mut self) -> Result<Header> {
        self.skip_frame()?;

        let header = match read_header(&mut self.source) {
            Ok(header) => header,
            Err(WebSocketError::EndOfStream) if self.state.fragmented => {
                return Err(WebSocketError::UnexpectedEndOfStream);
            }
            Err(err) => return Err(err),
        };

        #[cfg(feature = "logging")]
        log::trace!(
            "{} <<fin={} {:?} len={} masked={}",
            self.state.side,
            header.fin,
            header.opcode,
            header.length,
            header.is_masked()
        );

        check_header(&header, self.state)?;
        if let Some(max) = self.options.max_frame_size {
            if header.length > max {
                return Err(WebSocketError::FrameTooLarge {
                    length: header.length,
                    max,
                });
            }
        }

        if header.opcode.is_control() {
            return self.on_control(header);
        }

        if !self.state.fragmented {
            self.opcode = header.opcode;
            self.utf8.reset();
            self.check_text = self.options.check_utf8 && header.opcode == OpCode::Text;
        }
        self.state.fragmented = !header.fin;
        self.phase = Phase::Data(Payload::new(header));

        Ok(header)
    }

    fn on_control(&mut self, header: Header) -> Result<Header> {
        if let Some(hook) = self.intermediate.as_mut() {
            let mut buf = [0u8; MAX_CONTROL_PAYLOAD];
            // the header check bounds control payloads
            let payload = &mut buf[..header.length as usize];
            self.source.read_exact(payload)?;
            if let Some(mask) = header.mask {
                apply_mask(payload, mask, 0);
            }

            hook.on_intermediate(&header, &mut &payload[..], &mut self.source)?;
            return Ok(header);
        }

        self.phase = Phase::Control(Payload::new(header));
        if self.state.fragmented {
            self.skip_frame()?;
        } else {
            self.opcode = header.opcode;
            self.utf8.reset();
            self.check_text = false;
        }
        Ok(header)
    }

    /// Drops the rest of the payload of the current frame.
    fn skip_frame(&mut self) -> Result<()> {
        let remaining = match self.phase {
            Phase::AwaitingHeader => return Ok(()),
            Phase::Data(payload) | Phase::Control(payload) => payload.remaining(),
        };

        if remaining > 0 {
            let skipped = io::copy(&mut (&mut self.source).take(remaining), &mut io::sink())?;
            if skipped < remaining {
                return Err(WebSocketError::UnexpectedEndOfStream);
            }
        }

        self.phase = Phase::AwaitingHeader;
        Ok(())
    }

    /// Reads payload bytes of the current message into `buf`.
    ///
    /// Once the payload of a non-final frame is consumed the reader moves on to the continuation
    /// frame by itself, so a fragmented message reads as one byte stream. `Ok(0)` marks the end of
    /// the message.
    ///
    /// # Errors
    /// - [`WebSocketError::NoFrameAdvance`] if no call to [`Reader::next_frame`] moved the
    ///   reader onto a frame.
    /// - [`ProtocolError::InvalidUtf8`] as soon as a text message is known to be invalid, with
    ///   UTF-8 validation enabled.
    /// - [`WebSocketError::UnexpectedEndOfStream`] if the stream ends inside the message.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let (mut payload, control) = match self.phase {
                Phase::AwaitingHeader => {
                    if !self.state.fragmented {
                        return Err(WebSocketError::NoFrameAdvance);
                    }
                    self.next_frame()?;
                    continue;
                }
                Phase::Data(payload) => (payload, false),
                Phase::Control(payload) => (payload, true),
            };

            let remaining = payload.remaining();
            if remaining == 0 {
                if !payload.header.fin {
                    self.phase = Phase::AwaitingHeader;
                    continue;
                }
                if self.check_text && !self.utf8.is_complete() {
                    return Err(ProtocolError::InvalidUtf8.into());
                }
                return Ok(0);
            }

            let len = usize::try_from(remaining)
                .map_or(buf.len(), |remaining| remaining.min(buf.len()));
            if len == 0 {
                return Ok(0);
            }

            let n = self.source.read(&mut buf[..len])?;
            if n == 0 {
                return Err(WebSocketError::UnexpectedEndOfStream);
            }

            if let Some(mask) = payload.header.mask {
                apply_mask(&mut buf[..n], mask, (payload.pos & 3) as usize);
            }
            payload.pos += n as u64;
            self.phase = if control {
                Phase::Control(payload)
            } else {
                Phase::Data(payload)
            };

            if self.check_text && !self.utf8.feed(&buf[..n]) {
                return Err(ProtocolError::InvalidUtf8.into());
            }
            return Ok(n);
        }
    }

    /// Reads the rest of the current message into `out`, returning the number of bytes appended.
    pub fn read_all(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Consumes and drops the rest of the current message, continuation frames included.
    pub fn discard(&mut self) -> Result<()> {
        if matches!(self.phase, Phase::AwaitingHeader) && !self.state.fragmented {
            return Ok(());
        }

        self.check_text = false;
        let mut chunk = [0u8; READ_CHUNK];
        while self.read(&mut chunk)? > 0 {}
        Ok(())
    }
}

impl<R, I> Read for Reader<R, I>
where
    R: Read,
    I: Intermediate<R>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Reader::read(self, buf).map_err(io::Error::from)
    }
}
