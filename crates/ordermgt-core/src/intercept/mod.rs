//! Call interception for unary and streaming gRPC calls.
//!
//! The same [`Interceptor`] is used by the server around its handlers and by
//! the client around its outbound calls:
//!
//! - [`Interceptor::unary`] runs the pre hook, awaits the call, then runs the
//!   post hook with either the reply or the error. The result is returned
//!   untouched.
//! - [`Interceptor::stream_opened`] / [`Interceptor::stream_closed`] are the
//!   once-per-call hooks of a streaming call.
//! - [`Interceptor::wrap`] substitutes the stream's send/receive capability
//!   with an [`Intercepted`] decorator so every message is observed.
//!
//! ## Submodules
//!
//! - [`observer`] - hook trait and the stock observers.
//! - [`stream`] - stream capability traits, transport adapters and the
//!   decorator.

pub mod observer;
pub mod stream;

pub use observer::{
    CallInfo, CallKind, CallObserver, Direction, NoopObserver, Outcome, Side, TracingObserver,
};
pub use stream::{
    InboundStream, Intercepted, OutboundSink, RequestSink, ResponseSink, StreamInbound,
};

use core::fmt::Debug;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Entry point of the interception pipeline.
///
/// Cheap to clone; all clones share the same observer.
#[derive(Clone)]
pub struct Interceptor {
    observer: Arc<dyn CallObserver>,
}

impl Interceptor {
    pub fn new(observer: Arc<dyn CallObserver>) -> Self {
        Self { observer }
    }

    /// Interceptor that logs through [`TracingObserver`].
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingObserver))
    }

    /// Interceptor that observes nothing.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopObserver))
    }

    /// Wraps a single request/response exchange in the pre/post hooks.
    ///
    /// `call` is either the server handler or the client invocation; both
    /// share the `Request -> Result<Response, Status>` shape.
    pub async fn unary<Req, Res, F, Fut>(
        &self,
        info: CallInfo,
        request: Request<Req>,
        call: F,
    ) -> Result<Response<Res>, Status>
    where
        Req: Debug,
        Res: Debug,
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Res>, Status>>,
    {
        self.observer.on_call_start(&info, Some(request.get_ref()));

        let result = call(request).await;

        match &result {
            Ok(response) => self
                .observer
                .on_call_end(&info, Outcome::Reply(response.get_ref())),
            Err(status) => self.observer.on_call_end(&info, Outcome::Failed(status)),
        }

        result
    }

    /// Pre hook of a streaming call. Server-streaming calls pass their single
    /// request message.
    pub fn stream_opened(&self, info: &CallInfo, request: Option<&dyn Debug>) {
        self.observer.on_call_start(info, request);
    }

    /// Substitutes the message-transfer capability of a stream.
    pub fn wrap<S>(&self, info: CallInfo, inner: S) -> Intercepted<S> {
        Intercepted::new(inner, info, Arc::clone(&self.observer))
    }

    /// Post hook of a streaming call, observing its terminal result.
    pub fn stream_closed<T, E>(&self, info: &CallInfo, result: &Result<T, E>)
    where
        E: core::error::Error,
    {
        match result {
            Ok(_) => self.observer.on_call_end(info, Outcome::Completed),
            Err(err) => self.observer.on_call_end(info, Outcome::Failed(err)),
        }
    }
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::tracing()
    }
}

impl Debug for Interceptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interceptor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CallObserver for Recorder {
        fn on_call_start(&self, info: &CallInfo, request: Option<&dyn Debug>) {
            self.events
                .lock()
                .push(format!("start {} {:?}", info.method, request));
        }

        fn on_message(&self, _info: &CallInfo, direction: Direction, message: &dyn Debug) {
            self.events
                .lock()
                .push(format!("message {direction:?} {message:?}"));
        }

        fn on_call_end(&self, info: &CallInfo, outcome: Outcome<'_>) {
            let event = match outcome {
                Outcome::Reply(reply) => format!("reply {reply:?}"),
                Outcome::Completed => "completed".to_string(),
                Outcome::Failed(err) => format!("failed {err}"),
            };
            self.events.lock().push(format!("end {} {event}", info.method));
        }
    }

    const UNARY: CallInfo = CallInfo::client("/test/Unary", CallKind::Unary);
    const STREAM: CallInfo = CallInfo::server("/test/Stream", CallKind::ClientStreaming);

    #[tokio::test]
    async fn unary_observes_reply_without_altering_it() {
        let recorder = Arc::new(Recorder::default());
        let interceptor = Interceptor::new(recorder.clone());

        let response = interceptor
            .unary(UNARY, Request::new(21_u32), |req| async move {
                Ok(Response::new(req.into_inner() * 2))
            })
            .await
            .unwrap();

        assert_eq!(response.into_inner(), 42);
        assert_eq!(
            *recorder.events.lock(),
            vec![
                "start /test/Unary Some(21)".to_string(),
                "end /test/Unary reply 42".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn unary_observes_error_without_swallowing_it() {
        let recorder = Arc::new(Recorder::default());
        let interceptor = Interceptor::new(recorder.clone());

        let status = interceptor
            .unary(UNARY, Request::new(1_u32), |_req| async move {
                Err::<Response<u32>, _>(Status::invalid_argument("nope"))
            })
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "nope");

        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[1].starts_with("end /test/Unary failed"));
        assert!(events[1].contains("nope"));
    }

    #[tokio::test]
    async fn stream_hooks_bracket_per_message_events() {
        let recorder = Arc::new(Recorder::default());
        let interceptor = Interceptor::new(recorder.clone());

        interceptor.stream_opened(&STREAM, None);
        let mut inbound = interceptor.wrap(
            STREAM,
            StreamInbound::new(futures::stream::iter(vec![Ok::<_, Status>("a")])),
        );
        let mut received = Vec::new();
        let result: crate::Result<()> = async {
            while let Some(message) = inbound.recv().await? {
                received.push(message);
            }
            Ok::<(), crate::Error>(())
        }
        .await;
        interceptor.stream_closed(&STREAM, &result);

        assert_eq!(received, vec!["a"]);
        assert_eq!(
            *recorder.events.lock(),
            vec![
                "start /test/Stream None".to_string(),
                "message Received \"a\"".to_string(),
                "end /test/Stream completed".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn stream_closed_reports_failures() {
        let recorder = Arc::new(Recorder::default());
        let interceptor = Interceptor::new(recorder.clone());

        let result: crate::Result<()> = Err(crate::Error::RequestCancelled);
        interceptor.stream_closed(&STREAM, &result);

        assert_eq!(
            *recorder.events.lock(),
            vec!["end /test/Stream failed Request cancelled by client".to_string()]
        );
    }
}
