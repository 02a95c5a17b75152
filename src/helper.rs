//! Message level helpers built on [`Reader`], [`Writer`] and [`ControlHandler`].
//!
//! These functions trade the streaming interface for convenience: whole messages are collected
//! in memory and written as single frames.
use std::{
    cell::Cell,
    io::{self, Read, Write},
};

use crate::{
    check::Side,
    control::ControlHandler,
    frame::{write_frame, Frame, Header, OpCode},
    reader::{Intermediate, Reader},
    writer::Writer,
    Result, WebSocketError,
};

/// A message received from the peer, with the payload of all its fragments and the opcode of
/// its first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }
}

/// Reads the next message from `source` and appends it to `messages`.
///
/// Control frames interleaved between the fragments of a data message are appended before it,
/// in the order they were received. A control frame between two messages is appended on its
/// own. Text messages are validated as UTF-8.
///
/// Control messages are not answered, see [`handle_control_message`].
pub fn read_message<R: Read>(source: R, side: Side, messages: &mut Vec<Message>) -> Result<()> {
    let mut reader = Reader::new(source, side)
        .with_utf8()
        .with_callback(|header, payload| {
            let mut bytes = Vec::new();
            payload.read_to_end(&mut bytes)?;
            messages.push(Message::new(header.opcode, bytes));
            Ok(())
        });

    let header = reader.next_frame()?;
    if header.opcode.is_control() {
        return Ok(());
    }

    let mut payload = Vec::new();
    reader.read_all(&mut payload)?;
    drop(reader);

    messages.push(Message::new(header.opcode, payload));
    Ok(())
}

/// Reads the next message sent by a client, from the server side.
pub fn read_client_message<R: Read>(source: R, messages: &mut Vec<Message>) -> Result<()> {
    read_message(source, Side::Server, messages)
}

/// Reads the next message sent by a server, from the client side.
pub fn read_server_message<R: Read>(source: R, messages: &mut Vec<Message>) -> Result<()> {
    read_message(source, Side::Client, messages)
}

/// Reads the next data message from `stream`, answering control frames on its write half.
///
/// Blocks until a text or binary message arrives. A close frame from the peer is answered and
/// surfaces as [`WebSocketError::Closed`]. Protocol violations are answered with a
/// protocol-error close frame before they are returned.
pub fn read_data<S: Read + Write>(stream: S, side: Side) -> Result<(Vec<u8>, OpCode)> {
    read_data_matching(stream, side, |_| true)
}

/// Reads the next data message sent by a client, from the server side.
pub fn read_client_data<S: Read + Write>(stream: S) -> Result<(Vec<u8>, OpCode)> {
    read_data(stream, Side::Server)
}

/// Reads the next text message sent by a client, discarding binary messages.
pub fn read_client_text<S: Read + Write>(stream: S) -> Result<Vec<u8>> {
    read_data_matching(stream, Side::Server, |opcode| opcode == OpCode::Text).map(|(p, _)| p)
}

/// Reads the next binary message sent by a client, discarding text messages.
pub fn read_client_binary<S: Read + Write>(stream: S) -> Result<Vec<u8>> {
    read_data_matching(stream, Side::Server, |opcode| opcode == OpCode::Binary).map(|(p, _)| p)
}

/// Reads the next data message sent by a server, from the client side.
pub fn read_server_data<S: Read + Write>(stream: S) -> Result<(Vec<u8>, OpCode)> {
    read_data(stream, Side::Client)
}

/// Reads the next text message sent by a server, discarding binary messages.
pub fn read_server_text<S: Read + Write>(stream: S) -> Result<Vec<u8>> {
    read_data_matching(stream, Side::Client, |opcode| opcode == OpCode::Text).map(|(p, _)| p)
}

/// Reads the next binary message sent by a server, discarding text messages.
pub fn read_server_binary<S: Read + Write>(stream: S) -> Result<Vec<u8>> {
    read_data_matching(stream, Side::Client, |opcode| opcode == OpCode::Binary).map(|(p, _)| p)
}

/// Answers control frames and remembers whether a close frame went out.
struct Responder<'a> {
    handler: ControlHandler,
    closed: &'a Cell<bool>,
}

impl<S: Write + ?Sized> Intermediate<S> for Responder<'_> {
    fn on_intermediate(
        &mut self,
        header: &Header,
        payload: &mut dyn Read,
        stream: &mut S,
    ) -> Result<()> {
        if header.opcode == OpCode::Close {
            self.closed.set(true);
        }
        self.handler.on_intermediate(header, payload, stream)
    }
}

fn read_data_matching<S, F>(stream: S, side: Side, want: F) -> Result<(Vec<u8>, OpCode)>
where
    S: Read + Write,
    F: Fn(OpCode) -> bool,
{
    let handler = ControlHandler::new(side);
    let closed = Cell::new(false);
    let mut reader = Reader::new(stream, side)
        .with_utf8()
        .with_intermediate(Responder {
            handler,
            closed: &closed,
        });

    let res = loop {
        let header = match reader.next_frame() {
            Ok(header) => header,
            Err(err) => break Err(err),
        };
        // already answered by the responder
        if header.opcode.is_control() {
            continue;
        }

        if !want(header.opcode) {
            if let Err(err) = reader.discard() {
                break Err(err);
            }
            continue;
        }

        let mut payload = Vec::new();
        break reader.read_all(&mut payload).map(|_| (payload, header.opcode));
    };

    match res {
        Err(err @ WebSocketError::Protocol(_)) if !closed.get() => {
            Err(handler.reject(reader.get_mut(), err))
        }
        res => res,
    }
}

/// Writes `payload` as a single final frame.
///
/// On the client side the frame is masked on a copy, `payload` is left untouched. Use a
/// [`Writer`] to send a message in fragments.
pub fn write_message<W: Write>(mut dest: W, side: Side, opcode: OpCode, payload: &[u8]) -> Result<()> {
    let mut frame = Frame::new(true, opcode, payload);
    if side.is_client() {
        frame.mask();
    }
    write_frame(&mut dest, &frame)?;
    dest.flush()?;
    Ok(())
}

/// Writes a message from the server side.
pub fn write_server_message<W: Write>(dest: W, opcode: OpCode, payload: &[u8]) -> Result<()> {
    write_message(dest, Side::Server, opcode, payload)
}

pub fn write_server_text<W: Write>(dest: W, payload: &[u8]) -> Result<()> {
    write_server_message(dest, OpCode::Text, payload)
}

pub fn write_server_binary<W: Write>(dest: W, payload: &[u8]) -> Result<()> {
    write_server_message(dest, OpCode::Binary, payload)
}

/// Writes a message from the client side.
pub fn write_client_message<W: Write>(dest: W, opcode: OpCode, payload: &[u8]) -> Result<()> {
    write_message(dest, Side::Client, opcode, payload)
}

pub fn write_client_text<W: Write>(dest: W, payload: &[u8]) -> Result<()> {
    write_client_message(dest, OpCode::Text, payload)
}

pub fn write_client_binary<W: Write>(dest: W, payload: &[u8]) -> Result<()> {
    write_client_message(dest, OpCode::Binary, payload)
}

/// Answers a control message collected by [`read_message`].
///
/// The payload of `message` is expected to be unmasked already.
pub fn handle_control_message<W: Write>(mut dest: W, side: Side, message: &Message) -> Result<()> {
    let header = Header::new(true, message.opcode, message.payload.len() as u64);
    ControlHandler::new(side).handle(&header, &mut &message.payload[..], &mut dest)
}

/// Answers a control message sent by a client, from the server side.
pub fn handle_client_control_message<W: Write>(dest: W, message: &Message) -> Result<()> {
    handle_control_message(dest, Side::Server, message)
}

/// Answers a control message sent by a server, from the client side.
pub fn handle_server_control_message<W: Write>(dest: W, message: &Message) -> Result<()> {
    handle_control_message(dest, Side::Client, message)
}

/// Returns a [`Reader`] callback that answers control frames on `dest`.
///
/// Useful when the read and write halves of a connection are separate handles.
pub fn control_frame_handler<W: Write>(
    mut dest: W,
    side: Side,
) -> impl FnMut(&Header, &mut dyn Read) -> Result<()> {
    let mut handler = ControlHandler::new(side);
    move |header: &Header, payload: &mut dyn Read| {
        Intermediate::<W>::on_intermediate(&mut handler, header, payload, &mut dest)
    }
}

/// Sends everything `src` yields as one message on `writer`, returning the number of payload
/// bytes.
///
/// The message is fragmented as configured on the writer and always terminated, unless an
/// error occurs.
pub fn send_message<W, R>(writer: &mut Writer<W>, src: &mut R, is_text: bool) -> Result<u64>
where
    W: Write,
    R: Read + ?Sized,
{
    writer.begin(if is_text {
        OpCode::Text
    } else {
        OpCode::Binary
    });

    let copied = io::copy(src, writer)?;
    writer.flush()?;

    #[cfg(feature = "logging")]
    log::trace!("{} sent message of {copied} bytes", writer.side());

    Ok(copied)
}
