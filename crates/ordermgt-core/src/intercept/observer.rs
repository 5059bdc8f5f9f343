//! Observation hooks invoked by the interceptor pipeline.
//!
//! A [`CallObserver`] sees three kinds of events:
//!
//! - `on_call_start` - once, before the handler (server) or the remote
//!   invocation (client) runs. Unary calls pass the request message.
//! - `on_message` - once per message crossing a wrapped stream, in either
//!   direction.
//! - `on_call_end` - once, after the call completed, with either the reply,
//!   a plain stream completion, or the error.
//!
//! Observers only look. They cannot alter or suppress requests, replies, or
//! errors.

use core::fmt::Debug;

/// Which end of the connection the interceptor runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

/// The gRPC call shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidirectional,
}

/// Direction of a single stream message relative to the observing side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

/// Static description of the call being observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallInfo {
    pub method: &'static str,
    pub kind: CallKind,
    pub side: Side,
}

impl CallInfo {
    pub const fn server(method: &'static str, kind: CallKind) -> Self {
        Self {
            method,
            kind,
            side: Side::Server,
        }
    }

    pub const fn client(method: &'static str, kind: CallKind) -> Self {
        Self {
            method,
            kind,
            side: Side::Client,
        }
    }
}

/// How a call finished.
pub enum Outcome<'a> {
    /// A unary call returned a reply.
    Reply(&'a dyn Debug),
    /// A streaming call completed without error.
    Completed,
    /// The call failed.
    Failed(&'a dyn core::error::Error),
}

/// Pre/post observation hooks shared by unary and streaming interception.
///
/// Every method defaults to a no-op so implementations only override what
/// they care about.
pub trait CallObserver: Send + Sync + 'static {
    fn on_call_start(&self, _info: &CallInfo, _request: Option<&dyn Debug>) {}

    fn on_message(&self, _info: &CallInfo, _direction: Direction, _message: &dyn Debug) {}

    fn on_call_end(&self, _info: &CallInfo, _outcome: Outcome<'_>) {}
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Observer that logs every event through `tracing`.
///
/// Compiles to a no-op unless the `tracing` feature is enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn on_call_start(&self, _info: &CallInfo, _request: Option<&dyn Debug>) {
        #[cfg(feature = "tracing")]
        {
            match _request {
                Some(request) => tracing::info!(
                    method = _info.method,
                    side = ?_info.side,
                    kind = ?_info.kind,
                    "Pre-processing request: {:?}",
                    request
                ),
                None => tracing::info!(
                    method = _info.method,
                    side = ?_info.side,
                    kind = ?_info.kind,
                    "Stream opened"
                ),
            }
        }
    }

    fn on_message(&self, _info: &CallInfo, _direction: Direction, _message: &dyn Debug) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = _info.method,
            side = ?_info.side,
            direction = ?_direction,
            "Stream message: {:?}",
            _message
        );
    }

    fn on_call_end(&self, _info: &CallInfo, _outcome: Outcome<'_>) {
        #[cfg(feature = "tracing")]
        {
            match _outcome {
                Outcome::Reply(reply) => tracing::info!(
                    method = _info.method,
                    side = ?_info.side,
                    "Post-processing reply: {:?}",
                    reply
                ),
                Outcome::Completed => tracing::info!(
                    method = _info.method,
                    side = ?_info.side,
                    "Stream completed"
                ),
                Outcome::Failed(err) => tracing::warn!(
                    method = _info.method,
                    side = ?_info.side,
                    "Call failed: {}",
                    err
                ),
            }
        }
    }
}
