//! Streaming RPC runtime.
//!
//! Every call gets a [`CallContext`] (deadline plus cancellation) and a pair of
//! bounded frame channels. Handlers are registered on an [`RpcRouter`] under
//! one of four call patterns; the same routes can be served over HTTP with
//! [`MakeServiceBuilder`] or driven in-process through [`LocalChannel`].
//!
//! ```rust,ignore
//! use callwire::{CallContext, RpcRouter, Sender, Status};
//!
//! let router = RpcRouter::new()
//!     .unary("calculator.CalculatorService", "Sum", |_ctx: CallContext, req: SumRequest| async move {
//!         Ok(SumResponse { sum_result: req.first_number + req.second_number })
//!     })
//!     .server_stream(
//!         "greet.GreetService",
//!         "GreetManyTimes",
//!         |_ctx: CallContext, req: GreetManyTimesRequest, tx: Sender<GreetManyTimesResponse>| async move {
//!             tx.send(GreetManyTimesResponse { result: "hi".into() }).await
//!         },
//!     );
//!
//! let app = callwire::MakeServiceBuilder::new().add_router(router).build();
//! ```

pub mod channel;
pub mod context;
mod error;
mod handler;
mod local;
mod message;
pub mod pattern;
mod pipeline;
mod protocol;
mod request;
mod response;
mod router;
mod service_builder;

pub use channel::{Receiver, Sender};
pub use context::{CallContext, CancelCause};
pub use local::{ClientStreamCall, LocalChannel};
pub use message::RpcMessage;
pub use protocol::RequestProtocol;
pub use router::{CallKind, MethodDescriptor, RpcRouter};
pub use service_builder::{DEFAULT_STREAM_BUFFER, MakeServiceBuilder, ServerConfig};

pub use callwire_core::{Code, DEFAULT_MAX_MESSAGE_SIZE, Encoding, MessageLimits, Status};

pub mod prelude {
    //! Common imports for services built on callwire.
    pub use crate::pattern::bidi::coordinate;
    pub use crate::{
        CallContext, CallKind, Code, Encoding, LocalChannel, MakeServiceBuilder, Receiver,
        RpcMessage, RpcRouter, Sender, Status,
    };
}
