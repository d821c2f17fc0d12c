//! Method routing.
//!
//! Calls are identified by `/{package.Service}/{Method}`. Each registered
//! path maps to one [`Route`]: its descriptor (path and call pattern) and the
//! type-erased runtime that serves it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use callwire_core::Status;
use tracing::Instrument;

use crate::channel::{Receiver, Sender};
use crate::context::CallContext;
use crate::handler::{BoxedMethod, ServerCall};
use crate::message::RpcMessage;
use crate::pattern;

/// The four call patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ServerStream => "server_stream",
            CallKind::ClientStream => "client_stream",
            CallKind::BidiStream => "bidi_stream",
        }
    }

    /// Whether the call uses envelope framing on the HTTP transport.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, CallKind::Unary)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one registered method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    service: String,
    method: String,
    path: String,
    kind: CallKind,
}

impl MethodDescriptor {
    pub fn new(service: impl Into<String>, method: impl Into<String>, kind: CallKind) -> Self {
        let service = service.into();
        let method = method.into();
        let path = format!("/{service}/{method}");
        Self {
            service,
            method,
            path,
            kind,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `/{service}/{method}`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }
}

#[derive(Clone)]
pub(crate) struct Route {
    descriptor: MethodDescriptor,
    method: BoxedMethod,
}

impl Route {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Serve one call; resolves once the response direction is closed.
    pub fn call(&self, call: ServerCall) -> impl Future<Output = ()> + Send + 'static {
        let span = tracing::debug_span!(
            "rpc",
            path = %self.descriptor.path(),
            kind = %self.descriptor.kind(),
        );
        let served = (self.method)(call);
        async move {
            tracing::debug!("call started");
            served.await;
        }
        .instrument(span)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry of methods, keyed by path.
///
/// Registering a path twice replaces the earlier handler.
///
/// ```rust,ignore
/// let router = RpcRouter::new()
///     .unary("greet.GreetService", "Greet", greet)
///     .bidi_stream("greet.GreetService", "GreetEveryone", greet_everyone);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RpcRouter {
    routes: BTreeMap<String, Route>,
}

impl RpcRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, descriptor: MethodDescriptor, method: BoxedMethod) -> Self {
        if self.routes.contains_key(descriptor.path()) {
            tracing::warn!(path = %descriptor.path(), "replacing registered method");
        }
        self.routes.insert(
            descriptor.path().to_owned(),
            Route { descriptor, method },
        );
        self
    }

    /// One request, one response.
    pub fn unary<Req, Resp, H, Fut>(self, service: &str, method: &str, handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(service, method, CallKind::Unary);
        self.insert(descriptor, pattern::unary::erase(handler))
    }

    /// One request, a stream of responses written through the [`Sender`].
    pub fn server_stream<Req, Resp, H, Fut>(self, service: &str, method: &str, handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(CallContext, Req, Sender<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(service, method, CallKind::ServerStream);
        self.insert(descriptor, pattern::server_stream::erase(handler))
    }

    /// A stream of requests read from the [`Receiver`], one response.
    pub fn client_stream<Req, Resp, H, Fut>(self, service: &str, method: &str, handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(CallContext, Receiver<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(service, method, CallKind::ClientStream);
        self.insert(descriptor, pattern::client_stream::erase(handler))
    }

    /// Independent request and response streams.
    pub fn bidi_stream<Req, Resp, H, Fut>(self, service: &str, method: &str, handler: H) -> Self
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: Fn(CallContext, Receiver<Req>, Sender<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::new(service, method, CallKind::BidiStream);
        self.insert(descriptor, pattern::bidi::erase(handler))
    }

    /// Add every route of `other`.
    pub fn merge(mut self, other: RpcRouter) -> Self {
        for (_, route) in other.routes {
            self = self.insert(route.descriptor, route.method);
        }
        self
    }

    pub(crate) fn route(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    pub(crate) fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Descriptors of all registered methods, ordered by path.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.routes.values().map(Route::descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
    struct Empty {}

    async fn noop(_ctx: CallContext, _req: Empty) -> Result<Empty, Status> {
        Ok(Empty {})
    }

    #[test]
    fn test_descriptor_path() {
        let descriptor = MethodDescriptor::new("greet.GreetService", "Greet", CallKind::Unary);
        assert_eq!(descriptor.path(), "/greet.GreetService/Greet");
        assert_eq!(descriptor.service(), "greet.GreetService");
        assert_eq!(descriptor.method(), "Greet");
        assert!(!descriptor.kind().is_streaming());
    }

    #[test]
    fn test_merge_and_lookup() {
        let first = RpcRouter::new().unary("a.A", "One", noop);
        let second = RpcRouter::new().client_stream(
            "b.B",
            "Two",
            |_ctx: CallContext, mut rx: Receiver<Empty>| async move {
                while rx.recv().await?.is_some() {}
                Ok::<_, Status>(Empty {})
            },
        );

        let router = first.merge(second);
        let paths: Vec<_> = router.methods().map(|m| m.path().to_owned()).collect();
        assert_eq!(paths, vec!["/a.A/One", "/b.B/Two"]);

        let route = router.route("/b.B/Two").unwrap();
        assert_eq!(route.descriptor().kind(), CallKind::ClientStream);
        assert!(router.route("/b.B/Three").is_none());
    }
}
