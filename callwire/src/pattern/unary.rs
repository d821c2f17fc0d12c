use std::future::Future;
use std::sync::Arc;

use callwire_core::Status;

use crate::channel::{Receiver, Sender};
use crate::context::CallContext;
use crate::handler::{BoxedMethod, ServerCall};
use crate::message::RpcMessage;
use crate::pattern::log_outcome;

pub(crate) fn erase<Req, Resp, H, Fut>(handler: H) -> BoxedMethod
where
    Req: RpcMessage,
    Resp: RpcMessage,
    H: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
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
    H: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    let ServerCall {
        ctx,
        encoding,
        requests,
        responses,
    } = call;
    let mut requests = Receiver::<Req>::new(requests, encoding);
    let responses = Sender::<Resp>::new(responses, encoding);

    let result = async {
        ctx.check()?;
        let request = requests.recv_single().await?;
        let response = (*handler)(ctx.clone(), request).await;
        ctx.check()?;
        responses.send(response?).await
    }
    .await;

    log_outcome(&result);
    responses.finish(result).await;
}
