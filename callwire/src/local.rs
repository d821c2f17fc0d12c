//! In-process transport.
//!
//! [`LocalChannel`] drives the routes of an [`RpcRouter`] over in-memory
//! bounded channels. Client and server share one [`CallContext`], so
//! cancelling it or letting its deadline pass ends the call on both sides.

use std::sync::Arc;

use callwire_core::{Encoding, Status};

use crate::channel::{Receiver, Sender, frame_channel};
use crate::context::CallContext;
use crate::handler::ServerCall;
use crate::message::RpcMessage;
use crate::router::{CallKind, RpcRouter};
use crate::service_builder::DEFAULT_STREAM_BUFFER;

/// Client for the routes of an in-process [`RpcRouter`].
///
/// ```rust,ignore
/// let channel = LocalChannel::new(calculator::router());
/// let ctx = CallContext::new();
/// let sum: SumResponse = channel.unary(SUM, &ctx, SumRequest { first_number: 3.0, second_number: 10.0 }).await?;
/// ```
#[derive(Clone, Debug)]
pub struct LocalChannel {
    routes: Arc<RpcRouter>,
    encoding: Encoding,
    buffer: usize,
}

impl LocalChannel {
    pub fn new(router: RpcRouter) -> Self {
        Self {
            routes: Arc::new(router),
            encoding: Encoding::Proto,
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Encoding used for messages on the in-memory channels.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Frames queued per call direction.
    pub fn with_buffer(mut self, frames: usize) -> Self {
        self.buffer = frames;
        self
    }

    fn open<Req, Resp>(
        &self,
        path: &str,
        kind: CallKind,
        ctx: &CallContext,
    ) -> Result<(Sender<Req>, Receiver<Resp>), Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        let route = self
            .routes
            .route(path)
            .ok_or_else(|| Status::unimplemented(format!("unknown method {path}")))?;
        let registered = route.descriptor().kind();
        if registered != kind {
            return Err(Status::unimplemented(format!(
                "{path} is a {registered} method, not {kind}"
            )));
        }

        let (request_tx, request_rx) = frame_channel(ctx, self.buffer);
        let (response_tx, response_rx) = frame_channel(ctx, self.buffer);
        tokio::spawn(route.call(ServerCall {
            ctx: ctx.clone(),
            encoding: self.encoding,
            requests: request_rx,
            responses: response_tx,
        }));

        Ok((
            Sender::new(request_tx, self.encoding),
            Receiver::new(response_rx, self.encoding),
        ))
    }

    pub async fn unary<Req, Resp>(
        &self,
        path: &str,
        ctx: &CallContext,
        request: Req,
    ) -> Result<Resp, Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        let (tx, mut rx) = self.open::<Req, Resp>(path, CallKind::Unary, ctx)?;
        send_one(tx, &mut rx, request).await?;
        recv_response(&mut rx).await
    }

    /// Send the request and return the stream of responses.
    pub async fn server_stream<Req, Resp>(
        &self,
        path: &str,
        ctx: &CallContext,
        request: Req,
    ) -> Result<Receiver<Resp>, Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        let (tx, mut rx) = self.open::<Req, Resp>(path, CallKind::ServerStream, ctx)?;
        send_one(tx, &mut rx, request).await?;
        Ok(rx)
    }

    pub fn client_stream<Req, Resp>(
        &self,
        path: &str,
        ctx: &CallContext,
    ) -> Result<ClientStreamCall<Req, Resp>, Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        let (tx, rx) = self.open(path, CallKind::ClientStream, ctx)?;
        Ok(ClientStreamCall { tx, rx })
    }

    pub fn bidi_stream<Req, Resp>(
        &self,
        path: &str,
        ctx: &CallContext,
    ) -> Result<(Sender<Req>, Receiver<Resp>), Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
    {
        self.open(path, CallKind::BidiStream, ctx)
    }
}

/// Client half of a client-streaming call.
#[derive(Debug)]
pub struct ClientStreamCall<Req, Resp> {
    tx: Sender<Req>,
    rx: Receiver<Resp>,
}

impl<Req: RpcMessage, Resp: RpcMessage> ClientStreamCall<Req, Resp> {
    pub async fn send(&self, request: Req) -> Result<(), Status> {
        self.tx.send(request).await
    }

    /// End the request stream and wait for the single response.
    pub async fn close_and_recv(self) -> Result<Resp, Status> {
        let Self { tx, mut rx } = self;
        tx.close().await;
        recv_response(&mut rx).await
    }
}

/// Send a single request and end the request stream. If the server already
/// gave up, its status is reported instead of the failed send.
async fn send_one<Req, Resp>(tx: Sender<Req>, rx: &mut Receiver<Resp>, request: Req) -> Result<(), Status>
where
    Req: RpcMessage,
    Resp: RpcMessage,
{
    if let Err(send_err) = tx.send(request).await {
        return match rx.recv().await {
            Err(status) => Err(status),
            Ok(_) => Err(send_err),
        };
    }
    tx.close().await;
    Ok(())
}

async fn recv_response<Resp: RpcMessage>(rx: &mut Receiver<Resp>) -> Result<Resp, Status> {
    rx.recv()
        .await?
        .ok_or_else(|| Status::internal("call finished without a response message"))
}
