//! Call pattern runtimes.
//!
//! Each runtime owns the state machine of one pattern on the server side:
//! how many request messages it reads, when the handler runs, and which
//! terminal frame closes the response direction.
//!
//! | pattern          | requests        | responses       |
//! |------------------|-----------------|-----------------|
//! | [`unary`]        | exactly one     | exactly one     |
//! | [`server_stream`]| exactly one     | zero or more    |
//! | [`client_stream`]| zero or more    | exactly one     |
//! | [`bidi`]         | zero or more    | zero or more    |
//!
//! In every pattern a cancelled or expired context wins over the handler's
//! own result: success is never reported for a call whose context was
//! cancelled before the handler returned.

pub mod bidi;
pub(crate) mod client_stream;
pub(crate) mod server_stream;
pub(crate) mod unary;

use callwire_core::{Code, Status};

pub(crate) fn log_outcome(result: &Result<(), Status>) {
    match result {
        Ok(()) => tracing::debug!("call finished"),
        Err(status) if status.code() == Code::Internal => {
            tracing::error!(error = %status, "call failed");
        }
        Err(status) if status.code().is_cancellation() => {
            tracing::debug!(code = %status.code(), "call stopped early");
        }
        Err(status) => tracing::debug!(error = %status, "call failed"),
    }
}
