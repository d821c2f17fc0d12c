//! Frame model and incremental frame decoding.
//!
//! A call's channel carries [`Frame`]s. End-of-stream and failure are two
//! distinct terminal frames; on the wire both travel in an end-of-stream
//! envelope, the failure with an `error` object in its payload.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::Stream;

use crate::envelope::{
    ENVELOPE_HEADER_SIZE, end_stream_frame, envelope_flags, parse_end_stream,
    parse_envelope_header, wrap_envelope,
};
use crate::error::{EnvelopeError, Status};
use crate::limits::MessageLimits;

/// One unit on a call's channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// An encoded message.
    Message(Bytes),
    /// The sender finished cleanly.
    End,
    /// The sender finished with an error.
    Error(Status),
}

impl Frame {
    /// Whether this frame ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Message(_))
    }

    /// Encode the frame as a wire envelope.
    pub fn to_envelope(&self) -> Result<Bytes, EnvelopeError> {
        let bytes = match self {
            Frame::Message(payload) => wrap_envelope(envelope_flags::MESSAGE, payload)?,
            Frame::End => end_stream_frame(None)?,
            Frame::Error(status) => end_stream_frame(Some(status))?,
        };
        Ok(Bytes::from(bytes))
    }
}

/// Stream adapter that parses envelope frames out of a byte stream.
///
/// Chunk boundaries of the underlying stream are irrelevant; frames are
/// reassembled in an internal buffer. Frame lengths are checked against the
/// configured [`MessageLimits`] as soon as the header arrives, before the
/// payload is buffered.
///
/// If the byte stream ends cleanly between frames without an end-of-stream
/// frame, the decoder yields [`Frame::End`]: clients are allowed to end their
/// half of a stream by closing the body.
pub struct FrameDecoder<S> {
    stream: S,
    buffer: BytesMut,
    limits: MessageLimits,
    finished: bool,
}

impl<S> FrameDecoder<S> {
    pub fn new(stream: S, limits: MessageLimits) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            limits,
            finished: false,
        }
    }

    /// Check if a terminal frame (or an error) has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Try to parse a complete frame from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed.
    fn try_parse_frame(&mut self) -> Result<Option<Frame>, EnvelopeError> {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let length = length as usize;
        self.limits.check_size(length)?;

        let frame_size = ENVELOPE_HEADER_SIZE + length;
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let mut frame_bytes = self.buffer.split_to(frame_size);
        let payload = frame_bytes.split_off(ENVELOPE_HEADER_SIZE).freeze();

        match flags {
            envelope_flags::MESSAGE => Ok(Some(Frame::Message(payload))),
            envelope_flags::COMPRESSED => Err(EnvelopeError::UnsupportedCompression),
            envelope_flags::END_STREAM => {
                let frame = match parse_end_stream(&payload)? {
                    Some(status) => Frame::Error(status),
                    None => Frame::End,
                };
                Ok(Some(frame))
            }
            other => Err(EnvelopeError::InvalidFlags(other)),
        }
    }
}

impl<S, E> Stream for FrameDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<Frame, EnvelopeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(frame)) => {
                    this.finished = frame.is_terminal();
                    return Poll::Ready(Some(Ok(frame)));
                }
                Ok(None) => {}
                Err(err) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
            }

            match ready!(Pin::new(&mut this.stream).poll_next(cx)) {
                Some(Ok(chunk)) => this.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(EnvelopeError::Transport(err.to_string()))));
                }
                None => {
                    this.finished = true;
                    if this.buffer.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::End)));
                    }
                    return Poll::Ready(Some(Err(EnvelopeError::Truncated {
                        buffered: this.buffer.len(),
                    })));
                }
            }
        }
    }
}
