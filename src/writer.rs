//! The fragmenting frame writer.
use std::{
    io::{self, Write},
    mem,
};

use bytes::BytesMut;

use crate::{
    check::Side,
    frame::{Header, OpCode, MAX_HEAD_SIZE},
    mask::apply_mask,
    options::{Options, DEFAULT_WRITE_BUFFER},
    Result,
};

/// Writes one logical message at a time to `W`, splitting it in fragments.
///
/// Bytes are buffered until the fragment size is reached, then sent as one frame. The first frame
/// of a message carries the message opcode and the following ones [`OpCode::Continuation`].
/// [`Writer::flush`] sends the final frame and must end every message. Frames are masked with a
/// fresh key when writing from the client side.
///
/// Control opcodes are never fragmented: the whole payload goes out on flush.
///
/// # Example
/// ```rust
/// use std::io::Cursor;
/// use wswire::{OpCode, Reader, Side, Writer};
///
/// # fn main() -> wswire::Result<()> {
/// let mut writer = Writer::new(Vec::new(), Side::Client, OpCode::Binary).with_fragment_size(4);
/// writer.write(b"0123456789")?;
/// writer.flush()?;
///
/// let mut reader = Reader::new(Cursor::new(writer.into_inner()), Side::Server);
/// reader.next_frame()?;
/// let mut message = Vec::new();
/// reader.read_all(&mut message)?;
/// assert_eq!(message, b"0123456789");
/// # Ok(())
/// # }
/// ```
pub struct Writer<W> {
    dest: W,
    side: Side,
    /// Opcode of the current message.
    opcode: OpCode,
    buffer: BytesMut,
    /// 0 sends every message as a single frame.
    fragment_size: usize,
    /// A fragment of the current message was already sent.
    fragmented: bool,
}

impl<W> Writer<W> {
    pub fn new(dest: W, side: Side, opcode: OpCode) -> Self {
        Self::with_options(dest, side, opcode, Options::default())
    }

    pub fn with_options(dest: W, side: Side, opcode: OpCode, options: Options) -> Self {
        Self {
            dest,
            side,
            opcode,
            buffer: BytesMut::with_capacity(DEFAULT_WRITE_BUFFER),
            fragment_size: options.fragment_size,
            fragmented: false,
        }
    }

    /// Emits a fragment every `size` bytes. Zero disables fragmentation.
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Starts over on a new destination, returning the previous one.
    ///
    /// Buffered bytes of an unfinished message are dropped.
    pub fn reset(&mut self, dest: W, side: Side, opcode: OpCode) -> W {
        self.side = side;
        self.begin(opcode);
        mem::replace(&mut self.dest, dest)
    }

    /// Starts a new message with `opcode` on the same destination.
    ///
    /// Buffered bytes of an unfinished message are dropped.
    pub fn begin(&mut self, opcode: OpCode) {
        self.opcode = opcode;
        self.buffer.clear();
        self.fragmented = false;
    }

    /// Number of bytes waiting for the next frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dest
    }

    pub fn into_inner(self) -> W {
        self.dest
    }
}

impl<W: Write> Writer<W> {
    /// Appends `buf` to the current message, emitting a fragment each time the buffer fills up.
    ///
    /// Always consumes the whole of `buf`.
    pub fn write(&mut self, mut buf: &[u8]) -> Result<usize> {
        let total = buf.len();

        if self.fragment_size == 0 || self.opcode.is_control() {
            self.buffer.extend_from_slice(buf);
            return Ok(total);
        }

        while !buf.is_empty() {
            let room = self.fragment_size.saturating_sub(self.buffer.len());
            let (head, tail) = buf.split_at(room.min(buf.len()));
            self.buffer.extend_from_slice(head);
            buf = tail;

            if self.buffer.len() >= self.fragment_size {
                self.emit(false)?;
            }
        }

        Ok(total)
    }

    /// Sends the buffered bytes as the final frame of the message and flushes the destination.
    ///
    /// The writer is then ready for the next message with the same opcode.
    pub fn flush(&mut self) -> Result<()> {
        self.emit(true)?;
        self.dest.flush()?;
        Ok(())
    }

    fn emit(&mut self, fin: bool) -> Result<()> {
        let opcode = if self.fragmented {
            OpCode::Continuation
        } else {
            self.opcode
        };

        let mut header = Header::new(fin, opcode, self.buffer.len() as u64);
        if self.side.is_client() {
            header = header.with_mask(rand::random());
        }

        let mut head = [0u8; MAX_HEAD_SIZE];
        let size = header.encode(&mut head)?;

        #[cfg(feature = "logging")]
        log::trace!(
            "{} >>fin={} {:?} len={}",
            self.side,
            header.fin,
            header.opcode,
            header.length
        );

        if let Some(mask) = header.mask {
            apply_mask(&mut self.buffer, mask, 0);
        }
        let sent = self
            .dest
            .write_all(&head[..size])
            .and_then(|()| self.dest.write_all(&self.buffer));
        if let Err(err) = sent {
            // keep the payload clear for a retry
            if let Some(mask) = header.mask {
                apply_mask(&mut self.buffer, mask, 0);
            }
            return Err(err.into());
        }

        self.buffer.clear();
        self.fragmented = !fin;
        Ok(())
    }
}

/// `flush` ends the current message, like [`Writer::flush`].
impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Writer::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Writer::flush(self).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{read_frame, Frame},
        ProtocolError, Reader, WebSocketError,
    };
    use std::io::Cursor;

    fn frames(wire: Vec<u8>) -> Vec<Frame> {
        let mut cursor = Cursor::new(wire);
        let mut frames = Vec::new();
        while (cursor.position() as usize) < cursor.get_ref().len() {
            frames.push(read_frame(&mut cursor).unwrap());
        }
        frames
    }

    #[test]
    fn test_single_frame_by_default() {
        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Text);
        writer.write(&[b'x'; 10_000]).unwrap();
        assert_eq!(writer.buffered(), 10_000);
        writer.flush().unwrap();

        let frames = frames(writer.into_inner());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_fin());
        assert_eq!(frames[0].opcode(), OpCode::Text);
        assert_eq!(frames[0].payload.len(), 10_000);
    }

    #[test]
    fn test_fragments() {
        let mut writer =
            Writer::new(Vec::new(), Side::Server, OpCode::Text).with_fragment_size(5);
        writer.write(b"fragmented ").unwrap();
        writer.write(b"payload").unwrap();
        writer.flush().unwrap();

        let frames = frames(writer.into_inner());
        let summary: Vec<_> = frames
            .iter()
            .map(|frame| (frame.is_fin(), frame.opcode(), frame.payload.to_vec()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (false, OpCode::Text, b"fragm".to_vec()),
                (false, OpCode::Continuation, b"ented".to_vec()),
                (false, OpCode::Continuation, b" payl".to_vec()),
                (true, OpCode::Continuation, b"oad".to_vec()),
            ]
        );
    }

    #[test]
    fn test_client_frames_are_masked() {
        let mut writer =
            Writer::new(Vec::new(), Side::Client, OpCode::Binary).with_fragment_size(3);
        writer.write(b"masked message").unwrap();
        writer.flush().unwrap();

        let wire = writer.into_inner();
        assert_eq!(wire[1] & 0x80, 0x80);

        let mut reader = Reader::new(Cursor::new(wire), Side::Server);
        reader.next_frame().unwrap();
        let mut message = Vec::new();
        reader.read_all(&mut message).unwrap();
        assert_eq!(message, b"masked message");
    }

    #[test]
    fn test_server_frames_are_not_masked() {
        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Text);
        writer.write(b"hi").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"\x81\x02hi".to_vec());
    }

    #[test]
    fn test_consecutive_messages() {
        let mut writer =
            Writer::new(Vec::new(), Side::Server, OpCode::Text).with_fragment_size(4);
        writer.write(b"first one").unwrap();
        writer.flush().unwrap();
        writer.write(b"second").unwrap();
        writer.flush().unwrap();

        let mut reader = Reader::new(Cursor::new(writer.into_inner()), Side::Client).with_utf8();
        for expected in [&b"first one"[..], &b"second"[..]] {
            let header = reader.next_frame().unwrap();
            assert_eq!(header.opcode, OpCode::Text);

            let mut message = Vec::new();
            reader.read_all(&mut message).unwrap();
            assert_eq!(message, expected);
        }
    }

    #[test]
    fn test_empty_message() {
        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Binary);
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), vec![0x82, 0x00]);
    }

    #[test]
    fn test_control_opcode_is_not_fragmented() {
        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Ping).with_fragment_size(2);
        writer.write(b"ping!").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"\x89\x05ping!".to_vec());

        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Ping);
        writer.write(&[0u8; 126]).unwrap();
        assert!(matches!(
            writer.flush(),
            Err(WebSocketError::Protocol(ProtocolError::ControlFrameInvalid))
        ));
    }

    #[test]
    fn test_invalid_client_control_keeps_payload() {
        let payload = [7u8; 126];
        let mut writer = Writer::new(Vec::new(), Side::Client, OpCode::Ping);
        writer.write(&payload).unwrap();

        assert!(writer.flush().is_err());
        assert_eq!(&writer.buffer[..], &payload[..]);
        assert!(writer.get_ref().is_empty());
    }

    /// Fails every write while `fail` is set.
    struct Flaky {
        fail: bool,
        out: Vec<u8>,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flush_retry_after_write_error() {
        let dest = Flaky {
            fail: true,
            out: Vec::new(),
        };
        let mut writer = Writer::new(dest, Side::Client, OpCode::Binary);
        writer.write(b"payload").unwrap();

        assert!(matches!(writer.flush(), Err(WebSocketError::IoError(_))));
        assert_eq!(&writer.buffer[..], b"payload");

        writer.get_mut().fail = false;
        writer.flush().unwrap();

        let mut reader = Reader::new(Cursor::new(writer.into_inner().out), Side::Server);
        reader.next_frame().unwrap();
        let mut message = Vec::new();
        reader.read_all(&mut message).unwrap();
        assert_eq!(message, b"payload");
    }

    #[test]
    fn test_reset() {
        let mut writer =
            Writer::new(Vec::new(), Side::Server, OpCode::Text).with_fragment_size(2);
        writer.write(b"abc").unwrap();

        let first = writer.reset(Vec::new(), Side::Server, OpCode::Binary);
        assert_eq!(first, b"\x01\x02ab".to_vec());
        assert_eq!(writer.buffered(), 0);

        writer.write(b"z").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"\x82\x01z".to_vec());
    }

    #[test]
    fn test_io_write() {
        let mut writer = Writer::new(Vec::new(), Side::Server, OpCode::Binary);
        io::copy(&mut &b"copied"[..], &mut writer).unwrap();
        Write::flush(&mut writer).unwrap();
        assert_eq!(writer.into_inner(), b"\x82\x06copied".to_vec());
    }
}
