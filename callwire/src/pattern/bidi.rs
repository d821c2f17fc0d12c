//! Bidirectional streaming.
//!
//! The server runtime hands both directions to the handler at once. A
//! handler written in lock-step form (receive, update state, send) needs
//! nothing more. When sending and receiving are independent, [`coordinate`]
//! runs both loops to completion on the current task.

use std::future::Future;
use std::sync::Arc;

use callwire_core::Status;
use futures::{Stream, StreamExt};

use crate::channel::{Receiver, Sender};
use crate::context::CallContext;
use crate::handler::{BoxedMethod, ServerCall};
use crate::message::RpcMessage;
use crate::pattern::log_outcome;

pub(crate) fn erase<Req, Resp, H, Fut>(handler: H) -> BoxedMethod
where
    Req: RpcMessage,
    Resp: RpcMessage,
    H: Fn(CallContext, Receiver<Req>, Sender<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |call: ServerCall| {
        let handler = handler.clone();
        Box::pin(run(handler, call))
    })
}

async fn run<Req, Resp, H, Fut>(handler: Arc<H>, call: ServerCall)
where
    Req: RpcMessage,
    Resp: RpcMessage,
    H: Fn(CallContext, Receiver<Req>, Sender<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    let ServerCall {
        ctx,
        encoding,
        requests,
        responses,
    } = call;
    let requests = Receiver::<Req>::new(requests, encoding);
    let responses = Sender::<Resp>::new(responses, encoding);

    let result = async {
        ctx.check()?;
        (*handler)(ctx.clone(), requests, responses.handle()).await?;
        ctx.check()
    }
    .await;

    log_outcome(&result);
    responses.finish(result).await;
}

/// Drive a send loop and a receive loop over one call until both finish.
///
/// The send loop forwards every item of `outgoing` and then closes the
/// sending direction. The receive loop folds every incoming message into
/// `init` with `on_recv` until the peer ends its direction. Both loops run on
/// the calling task, so `on_recv` is the only writer of the accumulator.
///
/// A failing receive loop aborts the send loop and its error is returned.
/// When sending fails first, the receive loop still runs to its end (the peer
/// finishes its direction or the context is cancelled) and its error, if
/// any, is returned in place of the send error.
///
/// ```rust,ignore
/// let (tx, rx) = channel.bidi_stream::<FindMaximumRequest, FindMaximumResponse>(PATH, ctx)?;
/// let numbers = futures::stream::iter([2, 1, 3, 2, 99]).map(|number| FindMaximumRequest { number });
/// let maxima = coordinate(numbers, tx, rx, Vec::new(), |seen, resp| seen.push(resp.maximum)).await?;
/// ```
pub async fn coordinate<Out, In, S, Acc, F>(
    outgoing: S,
    sender: Sender<Out>,
    mut receiver: Receiver<In>,
    init: Acc,
    mut on_recv: F,
) -> Result<Acc, Status>
where
    Out: RpcMessage,
    In: RpcMessage,
    S: Stream<Item = Out>,
    F: FnMut(&mut Acc, In),
{
    let send_loop = async move {
        let mut outgoing = std::pin::pin!(outgoing);
        while let Some(message) = outgoing.next().await {
            sender.send(message).await?;
        }
        sender.close().await;
        Ok::<(), Status>(())
    };

    let recv_loop = async move {
        let mut acc = init;
        while let Some(message) = receiver.recv().await? {
            on_recv(&mut acc, message);
        }
        Ok::<Acc, Status>(acc)
    };

    tokio::pin!(send_loop, recv_loop);
    tokio::select! {
        sent = &mut send_loop => {
            let acc = recv_loop.await?;
            sent?;
            Ok(acc)
        }
        received = &mut recv_loop => {
            let acc = received?;
            send_loop.await?;
            Ok(acc)
        }
    }
}
