//! Wire-level types for callwire.
//!
//! This crate holds everything that describes bytes on the wire and is shared
//! by the runtime (`callwire`) and the services built on it.
//!
//! ## Modules
//!
//! - [`error`]: Status codes and the error envelope
//! - [`envelope`]: Envelope framing functions
//! - [`frame`]: Frame model and the incremental frame decoder
//! - [`codec`]: JSON / protobuf message encoding
//! - [`limits`]: Message size limits

mod codec;
mod envelope;
mod error;
mod frame;
mod limits;

pub use codec::*;
pub use envelope::*;
pub use error::*;
pub use frame::*;
pub use limits::*;
