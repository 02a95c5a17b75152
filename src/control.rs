//! The control frame sub-protocol: answering pings, ignoring pongs and the closing handshake.
//!
//! A [`ControlHandler`] writes its replies directly to the outbound stream it is given. Replies
//! are masked when the handler runs on the client side.
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::{
    check::Side,
    close::{CloseCode, CloseFrame},
    frame::{write_header, Header, OpCode, MAX_CONTROL_PAYLOAD},
    mask::apply_mask,
    ProtocolError, Result, WebSocketError,
};

/// The peer closed the connection.
///
/// `code` is [`CloseCode::Status`] when the close frame carried no status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ws closed: {code} {reason}")]
pub struct ClosedError {
    pub code: CloseCode,
    pub reason: String,
}

/// Answers control frames on behalf of one side of a connection.
///
/// The handler keeps no state between calls.
///
/// # Example
/// ```rust
/// use wswire::{frame::{read_frame, Header, OpCode}, ControlHandler, Side};
///
/// # fn main() -> wswire::Result<()> {
/// let handler = ControlHandler::new(Side::Server);
/// let header = Header::new(true, OpCode::Ping, 4);
///
/// let mut reply = Vec::new();
/// handler.handle(&header, &mut &b"ping"[..], &mut reply)?;
///
/// let pong = read_frame(&mut &reply[..])?;
/// assert_eq!(pong.opcode(), OpCode::Pong);
/// assert_eq!(&pong.payload[..], b"ping");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlHandler {
    side: Side,
}

impl ControlHandler {
    pub fn new(side: Side) -> Self {
        Self { side }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Handles one control frame whose payload is read from `src`.
    ///
    /// If `header` carries a masking key the payload is unmasked while it is read. Replies are
    /// written to `dst`.
    ///
    /// # Errors
    /// - [`WebSocketError::NotControlFrame`] for data frames.
    /// - [`WebSocketError::Closed`] after a valid close frame was answered.
    /// - [`WebSocketError::Protocol`] after an invalid close frame was answered with
    ///   [`CloseCode::Protocol`].
    pub fn handle<R, W>(&self, header: &Header, src: &mut R, dst: &mut W) -> Result<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        match header.opcode {
            OpCode::Ping => self.handle_ping(header, src, dst),
            OpCode::Pong => self.handle_pong(header, src),
            OpCode::Close => self.handle_close(header, src, dst),
            _ => Err(WebSocketError::NotControlFrame),
        }
    }

    /// Replies to a ping with a pong carrying the same payload.
    pub fn handle_ping<R, W>(&self, header: &Header, src: &mut R, dst: &mut W) -> Result<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = [0u8; MAX_CONTROL_PAYLOAD];
        let payload = read_control_payload(header, src, &mut buf)?;

        write_control(dst, self.side, OpCode::Pong, payload)
    }

    /// Drains the payload of a pong. Pongs are never answered.
    pub fn handle_pong<R>(&self, header: &Header, src: &mut R) -> Result<()>
    where
        R: Read + ?Sized,
    {
        let drained = io::copy(&mut (&mut *src).take(header.length), &mut io::sink())?;
        if drained < header.length {
            return Err(WebSocketError::UnexpectedEndOfStream);
        }
        Ok(())
    }

    /// Completes the closing handshake started by the peer.
    ///
    /// A valid close frame is echoed with its status code only, and reported as
    /// [`WebSocketError::Closed`]. An invalid one is answered with [`CloseCode::Protocol`] and the
    /// violation is returned.
    pub fn handle_close<R, W>(&self, header: &Header, src: &mut R, dst: &mut W) -> Result<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = [0u8; MAX_CONTROL_PAYLOAD];
        let payload = read_control_payload(header, src, &mut buf)?;

        let body = match CloseFrame::decode(payload) {
            Ok(body) => body,
            Err(err) => {
                self.close_with_protocol_error(dst, err)?;
                return Err(err.into());
            }
        };

        let closed = match body {
            None => {
                self.write_close(dst, None)?;
                ClosedError {
                    code: CloseCode::Status,
                    reason: String::new(),
                }
            }
            Some(body) => {
                self.write_close(dst, Some(&CloseFrame::new(body.code, "")))?;
                ClosedError {
                    code: body.code,
                    reason: body.reason,
                }
            }
        };

        #[cfg(feature = "logging")]
        log::debug!(
            "{} received close {} {:?}",
            self.side,
            closed.code,
            closed.reason
        );

        Err(closed.into())
    }

    /// Sends a close frame, empty if `body` is `None`.
    pub fn write_close<W>(&self, dst: &mut W, body: Option<&CloseFrame>) -> Result<()>
    where
        W: Write + ?Sized,
    {
        match body {
            Some(body) => write_control(dst, self.side, OpCode::Close, &body.encode()),
            None => write_control(dst, self.side, OpCode::Close, &[]),
        }
    }

    /// Sends a close frame with [`CloseCode::Protocol`] and the violation as reason.
    pub fn close_with_protocol_error<W>(&self, dst: &mut W, err: ProtocolError) -> Result<()>
    where
        W: Write + ?Sized,
    {
        #[cfg(feature = "logging")]
        log::debug!("{} closing on protocol error: {err}", self.side);

        self.write_close(dst, Some(&CloseFrame::new(CloseCode::Protocol, err.to_string())))
    }

    /// Answers `err` with a protocol-error close frame if it is a protocol violation, and
    /// returns it unchanged.
    pub fn reject<W>(&self, dst: &mut W, err: WebSocketError) -> WebSocketError
    where
        W: Write + ?Sized,
    {
        if let WebSocketError::Protocol(violation) = &err {
            if let Err(write_err) = self.close_with_protocol_error(dst, *violation) {
                return write_err;
            }
        }
        err
    }
}

/// Reads the whole control payload into `buf`, unmasking it if needed.
fn read_control_payload<'a, R>(
    header: &Header,
    src: &mut R,
    buf: &'a mut [u8; MAX_CONTROL_PAYLOAD],
) -> Result<&'a mut [u8]>
where
    R: Read + ?Sized,
{
    let payload = usize::try_from(header.length)
        .ok()
        .and_then(|length| buf.get_mut(..length))
        .ok_or(ProtocolError::ControlFrameInvalid)?;

    src.read_exact(payload)?;
    if let Some(mask) = header.mask {
        apply_mask(payload, mask, 0);
    }
    Ok(payload)
}

/// Writes a single control frame and flushes `dst`.
pub(crate) fn write_control<W>(
    dst: &mut W,
    side: Side,
    opcode: OpCode,
    payload: &[u8],
) -> Result<()>
where
    W: Write + ?Sized,
{
    let mut buf = [0u8; MAX_CONTROL_PAYLOAD];
    let masked = buf
        .get_mut(..payload.len())
        .ok_or(ProtocolError::ControlFrameInvalid)?;
    masked.copy_from_slice(payload);

    let mut header = Header::new(true, opcode, payload.len() as u64);
    if side.is_client() {
        let mask: [u8; 4] = rand::random();
        apply_mask(masked, mask, 0);
        header = header.with_mask(mask);
    }

    write_header(dst, &header)?;
    dst.write_all(masked)?;
    dst.flush()?;
    Ok(())
}
