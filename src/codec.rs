//! Whole frame codec for `tokio_util::codec`.
//!
//! The codec buffers complete frames in memory, unlike the streaming [`Reader`](crate::Reader).
//! It applies the same header checks, and tracks fragmentation the same way.
use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    check::{check_header, Side, State},
    frame::{Frame, Header, MAX_HEAD_SIZE},
    mask::apply_mask,
    options::{Options, MAX_PAYLOAD_READ},
    WebSocketError,
};

/// Combines a [`Decoder`] and an [`Encoder`] for use with `Framed`.
pub struct Codec {
    decoder: Decoder,
    encoder: Encoder,
}

impl Codec {
    /// Creates a codec for one side of a connection with default options.
    pub fn new(side: Side) -> Self {
        Self::with_options(side, &Options::default())
    }

    pub fn with_options(side: Side, options: &Options) -> Self {
        Self {
            decoder: Decoder::with_options(side, options),
            encoder: Encoder::new(side),
        }
    }
}

impl From<(Decoder, Encoder)> for Codec {
    fn from((decoder, encoder): (Decoder, Encoder)) -> Self {
        Self { decoder, encoder }
    }
}

impl codec::Decoder for Codec {
    type Item = <Decoder as codec::Decoder>::Item;
    type Error = <Decoder as codec::Decoder>::Error;

    #[inline]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }

    #[inline]
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode_eof(src)
    }
}

impl codec::Encoder<Frame> for Codec {
    type Error = <Encoder as codec::Encoder<Frame>>::Error;

    #[inline]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}

/// Decodes frames received by one side of a connection.
///
/// Headers are checked as soon as they are complete, before waiting for the payload. Decoded
/// frames carry an unmasked payload and no masking key.
///
/// Frames are limited to [`MAX_PAYLOAD_READ`] bytes unless the options set another maximum.
pub struct Decoder {
    state: State,
    max_frame_size: u64,
    /// Header already checked, waiting for its payload.
    pending: Option<(Header, usize)>,
}

impl Decoder {
    pub fn new(side: Side) -> Self {
        Self::with_options(side, &Options::default())
    }

    pub fn with_options(side: Side, options: &Options) -> Self {
        Self {
            state: State::new(side),
            max_frame_size: options.max_frame_size.unwrap_or(MAX_PAYLOAD_READ),
            pending: None,
        }
    }

    pub fn with_max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Side and fragmentation state of the inbound stream.
    pub fn state(&self) -> State {
        self.state
    }

    fn next_header(&mut self, src: &[u8]) -> Result<Option<(Header, usize)>, WebSocketError> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }

        let Some((header, size)) = Header::parse(src)? else {
            return Ok(None);
        };

        check_header(&header, self.state)?;
        if header.length > self.max_frame_size {
            return Err(WebSocketError::FrameTooLarge {
                length: header.length,
                max: self.max_frame_size,
            });
        }

        Ok(Some((header, size)))
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((mut header, size)) = self.next_header(src)? else {
            src.reserve(MAX_HEAD_SIZE);
            return Ok(None);
        };

        let length = usize::try_from(header.length).map_err(|_| WebSocketError::FrameTooLarge {
            length: header.length,
            max: usize::MAX as u64,
        })?;

        if src.remaining() < size + length {
            // grows with the data when a large maximum is configured
            let missing = size + length - src.remaining();
            src.reserve(missing.min(MAX_PAYLOAD_READ as usize));
            self.pending = Some((header, size));
            return Ok(None);
        }

        src.advance(size);
        let mut payload = src.split_to(length);
        if let Some(mask) = header.mask.take() {
            apply_mask(&mut payload, mask, 0);
        }

        if header.opcode.is_data() {
            self.state.fragmented = !header.fin;
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "{} <<fin={} {:?} len={}",
            self.state.side,
            header.fin,
            header.opcode,
            header.length
        );

        Ok(Some(Frame { header, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if !src.is_empty() || self.pending.is_some() || self.state.fragmented {
            return Err(WebSocketError::UnexpectedEndOfStream);
        }
        Ok(None)
    }
}

/// Encodes frames sent by one side of a connection.
///
/// Client frames are masked with a fresh key, server frames are always sent unmasked. The
/// length in the frame header is ignored in favor of the payload length.
pub struct Encoder {
    side: Side,
}

impl Encoder {
    pub fn new(side: Side) -> Self {
        Self { side }
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    fn encode(&mut self, mut frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.side.is_client() {
            frame.mask();
        } else {
            frame.unmask();
        }

        let header = Header {
            length: frame.payload.len() as u64,
            ..frame.header
        };

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

        dst.reserve(size + frame.payload.len());
        dst.extend_from_slice(&head[..size]);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
