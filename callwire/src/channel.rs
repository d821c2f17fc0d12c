//! Message channels.
//!
//! Each direction of a call is one bounded, ordered queue of [`Frame`]s. A
//! direction ends with exactly one terminal frame: [`Frame::End`] or
//! [`Frame::Error`]. Sends suspend while the queue is full, so a slow reader
//! throttles the writer, and every send and receive races the call's
//! [`CallContext`].
//!
//! [`FrameSender`] / [`FrameReceiver`] move encoded bytes; [`Sender`] and
//! [`Receiver`] are the typed views handed to handlers and clients.

use std::marker::PhantomData;

use bytes::Bytes;
use callwire_core::{Encoding, Frame, Status};
use futures::Stream;
use tokio::sync::mpsc;

use crate::context::CallContext;
use crate::message::RpcMessage;

/// Create one direction of a call with room for `capacity` queued frames.
pub fn frame_channel(ctx: &CallContext, capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FrameSender {
            tx,
            ctx: ctx.clone(),
        },
        FrameReceiver {
            rx,
            ctx: ctx.clone(),
            terminal: None,
        },
    )
}

/// Writing half of one call direction.
#[derive(Clone, Debug)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    ctx: CallContext,
}

impl FrameSender {
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Queue one encoded message, waiting for room.
    ///
    /// Fails with the context's status once the call is cancelled, and with
    /// `Canceled` when the reading side is gone.
    pub async fn send_message(&self, message: Bytes) -> Result<(), Status> {
        self.ctx.check()?;
        tokio::select! {
            biased;
            cause = self.ctx.cancelled() => Err(cause.into_status()),
            sent = self.tx.send(Frame::Message(message)) => {
                sent.map_err(|_| Status::cancelled("peer closed the stream"))
            }
        }
    }

    /// Queue the terminal frame and close this direction.
    ///
    /// Delivery is best effort: on a cancelled call the frame is only queued
    /// if there is room, and a vanished reader is ignored.
    pub async fn finish(self, result: Result<(), Status>) {
        let frame = match result {
            Ok(()) => Frame::End,
            Err(status) => Frame::Error(status),
        };
        if self.ctx.is_cancelled() {
            let _ = self.tx.try_send(frame);
            return;
        }
        tokio::select! {
            biased;
            _ = self.tx.send(frame.clone()) => {}
            _ = self.ctx.cancelled() => {
                let _ = self.tx.try_send(frame);
            }
        }
    }
}

/// Reading half of one call direction.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
    ctx: CallContext,
    terminal: Option<Result<(), Status>>,
}

impl FrameReceiver {
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Next frame of this direction.
    ///
    /// Once a terminal frame was observed it is returned again on every call.
    /// A cancelled call yields an error frame with the cancellation status, and
    /// a writer that vanished without a terminal frame yields `Canceled`.
    pub async fn next_frame(&mut self) -> Frame {
        if let Some(terminal) = &self.terminal {
            return match terminal {
                Ok(()) => Frame::End,
                Err(status) => Frame::Error(status.clone()),
            };
        }
        if let Err(status) = self.ctx.check() {
            return Frame::Error(status);
        }
        let frame = tokio::select! {
            biased;
            cause = self.ctx.cancelled() => return Frame::Error(cause.into_status()),
            frame = self.rx.recv() => frame,
        };
        let frame = frame
            .unwrap_or_else(|| Frame::Error(Status::cancelled("stream closed without end-of-stream")));
        match &frame {
            Frame::Message(_) => {}
            Frame::End => self.terminal = Some(Ok(())),
            Frame::Error(status) => self.terminal = Some(Err(status.clone())),
        }
        frame
    }

    /// Next encoded message, `Ok(None)` at a clean end of stream.
    pub async fn recv_message(&mut self) -> Result<Option<Bytes>, Status> {
        match self.next_frame().await {
            Frame::Message(bytes) => Ok(Some(bytes)),
            Frame::End => Ok(None),
            Frame::Error(status) => Err(status),
        }
    }
}

/// Typed sending half of a call.
#[derive(Debug)]
pub struct Sender<T> {
    frames: FrameSender,
    encoding: Encoding,
    _message: PhantomData<fn(T)>,
}

impl<T: RpcMessage> Sender<T> {
    pub(crate) fn new(frames: FrameSender, encoding: Encoding) -> Self {
        Self {
            frames,
            encoding,
            _message: PhantomData,
        }
    }

    /// Another handle to the same direction, kept by the pattern runtime to
    /// write the terminal frame after the handler returns.
    pub(crate) fn handle(&self) -> Self {
        Self::new(self.frames.clone(), self.encoding)
    }

    pub fn context(&self) -> &CallContext {
        self.frames.context()
    }

    /// Encode and queue one message, suspending while the channel is full.
    pub async fn send(&self, message: T) -> Result<(), Status> {
        let bytes = self.encoding.encode(&message)?;
        self.frames.send_message(bytes).await
    }

    /// Close this direction cleanly.
    pub async fn close(self) {
        self.frames.finish(Ok(())).await;
    }

    /// Close this direction with an error.
    pub async fn abort(self, status: Status) {
        self.frames.finish(Err(status)).await;
    }

    pub(crate) async fn finish(self, result: Result<(), Status>) {
        self.frames.finish(result).await;
    }
}

/// Typed receiving half of a call.
#[derive(Debug)]
pub struct Receiver<T> {
    frames: FrameReceiver,
    encoding: Encoding,
    _message: PhantomData<fn() -> T>,
}

impl<T: RpcMessage> Receiver<T> {
    pub(crate) fn new(frames: FrameReceiver, encoding: Encoding) -> Self {
        Self {
            frames,
            encoding,
            _message: PhantomData,
        }
    }

    pub fn context(&self) -> &CallContext {
        self.frames.context()
    }

    /// Next message, `Ok(None)` once the peer finished sending.
    ///
    /// An undecodable message fails with `InvalidArgument`.
    pub async fn recv(&mut self) -> Result<Option<T>, Status> {
        match self.frames.recv_message().await? {
            Some(bytes) => Ok(Some(self.encoding.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Exactly one message followed by end of stream.
    pub(crate) async fn recv_single(&mut self) -> Result<T, Status> {
        let message = self
            .recv()
            .await?
            .ok_or_else(|| Status::invalid_argument("expected one request message, got none"))?;
        if self.recv().await?.is_some() {
            return Err(Status::invalid_argument(
                "expected one request message, got more",
            ));
        }
        Ok(message)
    }

    /// Adapt into a stream that ends after the end of input or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Status>> + Send {
        futures::stream::unfold(Some(self), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(Some(message)) => Some((Ok(message), Some(receiver))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
    }
}
