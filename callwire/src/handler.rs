//! Type-erased method handlers.
//!
//! The pattern runtimes turn typed handler closures into [`BoxedMethod`]s
//! that every transport drives the same way: hand over a [`ServerCall`] and
//! await the returned future.

use std::sync::Arc;

use callwire_core::Encoding;
use futures::future::BoxFuture;

use crate::channel::{FrameReceiver, FrameSender};
use crate::context::CallContext;

/// Server half of one call, as set up by a transport.
pub(crate) struct ServerCall {
    pub ctx: CallContext,
    pub encoding: Encoding,
    pub requests: FrameReceiver,
    pub responses: FrameSender,
}

pub(crate) type BoxedMethod = Arc<dyn Fn(ServerCall) -> BoxFuture<'static, ()> + Send + Sync>;
