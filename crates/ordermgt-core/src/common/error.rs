//! Error types for the order management service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the service. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate errors with `?` and clients get
//! a structured status code.
//!
//! ## Error Cases
//! - `InvalidField`: Business validation failed on a single field. Surfaces as
//!   `INVALID_ARGUMENT` with a `BadRequest` field violation in the status
//!   details.
//! - `MetadataMissing`: The call carried no metadata although the server
//!   requires it (`DATA_LOSS`).
//! - `UnknownOrder`: A streamed order id has no stored order (`NOT_FOUND`).
//! - `ChannelError`: An internal communication failure between tasks.
//! - `RequestCancelled`: The client went away mid-stream.
//! - `DeadlineExceeded`: The caller's deadline passed before the call ended.
//! - `ServiceShutdown`: The service is shutting down.
//! - `Transport`: A status received from the transport, passed through as-is.

use tonic::{Code, Status};
use tonic_types::{ErrorDetails, StatusExt};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the order management service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A single request field failed validation.
    #[error("Invalid field {field}: {description}")]
    InvalidField { field: String, description: String },

    /// The request carried no metadata.
    #[error("Failed to get metadata")]
    MetadataMissing,

    /// A referenced order does not exist in the store.
    #[error("Unknown order: {id}")]
    UnknownOrder { id: String },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The caller's deadline expired.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// A status produced by the transport or the remote peer.
    #[error("Transport error: {0}")]
    Transport(#[from] Status),
}

impl Error {
    /// Field violation for a request carrying the reserved invalid order id.
    pub fn invalid_order_id(id: &str, description: &str) -> Self {
        Error::InvalidField {
            field: "ID".to_string(),
            description: format!("Order ID received is not valid {id} : {description}"),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidField { field, description } => {
                let mut details = ErrorDetails::new();
                details.add_bad_request_violation(field, description);
                Status::with_error_details(
                    Code::InvalidArgument,
                    "Invalid information received",
                    details,
                )
            }
            Error::MetadataMissing => Status::data_loss("Failed to get metadata"),
            Error::UnknownOrder { id } => Status::not_found(format!("Order {id} not found")),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Transport(status) => status,
        }
    }
}
