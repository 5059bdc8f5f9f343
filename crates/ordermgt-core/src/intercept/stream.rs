//! Message-transfer capabilities of a call stream.
//!
//! Handlers and clients never touch transport types directly for per-message
//! work. They receive through an [`InboundStream`] and send through an
//! [`OutboundSink`]. That lets the interceptor substitute [`Intercepted`],
//! a decorator that forwards to the inner stream while reporting every
//! message to a [`CallObserver`].
//!
//! ## Adapters
//!
//! - [`StreamInbound`] - any `Stream<Item = Result<T, Status>>`, including
//!   `tonic::Streaming<T>` on both the server and the client.
//! - [`ResponseSink`] - server side response channel feeding a tonic
//!   response stream.
//! - [`RequestSink`] - client side request channel feeding a tonic request
//!   stream.

use super::observer::{CallInfo, CallObserver, Direction};
use crate::{Error, Result};
use core::fmt::Debug;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::Status;

/// The receive half of a call stream.
#[tonic::async_trait]
pub trait InboundStream: Send {
    type Message: Send;

    /// Receives the next message.
    ///
    /// Returns `Ok(None)` on clean end-of-input.
    async fn recv(&mut self) -> Result<Option<Self::Message>>;
}

/// The send half of a call stream.
#[tonic::async_trait]
pub trait OutboundSink: Send {
    type Message: Send;

    /// Sends one message to the peer.
    async fn send(&mut self, message: Self::Message) -> Result<()>;
}

/// [`InboundStream`] over a fallible message stream.
#[derive(Debug)]
pub struct StreamInbound<S> {
    inner: S,
}

impl<S> StreamInbound<S> {
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[tonic::async_trait]
impl<S, T> InboundStream for StreamInbound<S>
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin + Send,
    T: Send,
{
    type Message = T;

    async fn recv(&mut self) -> Result<Option<T>> {
        match self.inner.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(Error::Transport(status)),
            None => Ok(None),
        }
    }
}

/// [`OutboundSink`] feeding a server response stream.
///
/// A closed channel means the response stream was dropped, which tonic does
/// when the client cancels or disconnects.
#[derive(Debug)]
pub struct ResponseSink<T> {
    tx: mpsc::Sender<core::result::Result<T, Status>>,
}

impl<T> ResponseSink<T> {
    pub const fn new(tx: mpsc::Sender<core::result::Result<T, Status>>) -> Self {
        Self { tx }
    }
}

#[tonic::async_trait]
impl<T: Send> OutboundSink for ResponseSink<T> {
    type Message = T;

    async fn send(&mut self, message: T) -> Result<()> {
        self.tx
            .send(Ok(message))
            .await
            .map_err(|_| Error::RequestCancelled)
    }
}

/// [`OutboundSink`] feeding a client request stream.
#[derive(Debug)]
pub struct RequestSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> RequestSink<T> {
    pub const fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

#[tonic::async_trait]
impl<T: Send> OutboundSink for RequestSink<T> {
    type Message = T;

    async fn send(&mut self, message: T) -> Result<()> {
        self.tx.send(message).await.map_err(|e| Error::ChannelError {
            context: format!("Request stream closed: {e}"),
        })
    }
}

/// Decorator that reports every message crossing the wrapped stream.
///
/// Implements [`InboundStream`] and/or [`OutboundSink`] whenever the inner
/// value does, so it can be handed to code written against those traits
/// without that code noticing.
pub struct Intercepted<S> {
    inner: S,
    info: CallInfo,
    observer: Arc<dyn CallObserver>,
}

impl<S> Intercepted<S> {
    pub fn new(inner: S, info: CallInfo, observer: Arc<dyn CallObserver>) -> Self {
        Self {
            inner,
            info,
            observer,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[tonic::async_trait]
impl<S> InboundStream for Intercepted<S>
where
    S: InboundStream,
    S::Message: Debug,
{
    type Message = S::Message;

    async fn recv(&mut self) -> Result<Option<Self::Message>> {
        let message = self.inner.recv().await?;
        if let Some(message) = &message {
            self.observer
                .on_message(&self.info, Direction::Received, message);
        }
        Ok(message)
    }
}

#[tonic::async_trait]
impl<S> OutboundSink for Intercepted<S>
where
    S: OutboundSink,
    S::Message: Debug,
{
    type Message = S::Message;

    async fn send(&mut self, message: Self::Message) -> Result<()> {
        self.observer.on_message(&self.info, Direction::Sent, &message);
        self.inner.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::observer::CallKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(Direction, String)>>,
    }

    impl CallObserver for Recorder {
        fn on_message(&self, _info: &CallInfo, direction: Direction, message: &dyn Debug) {
            self.messages.lock().push((direction, format!("{message:?}")));
        }
    }

    const INFO: CallInfo = CallInfo::server("/test/Echo", CallKind::Bidirectional);

    #[tokio::test]
    async fn inbound_forwards_messages_and_end_of_input() {
        let inner = futures::stream::iter(vec![Ok::<_, Status>(1_u32), Ok(2)]);
        let recorder = Arc::new(Recorder::default());
        let mut inbound = Intercepted::new(StreamInbound::new(inner), INFO, recorder.clone());

        assert_eq!(inbound.recv().await.unwrap(), Some(1));
        assert_eq!(inbound.recv().await.unwrap(), Some(2));
        assert_eq!(inbound.recv().await.unwrap(), None);

        let messages = recorder.messages.lock();
        assert_eq!(
            *messages,
            vec![
                (Direction::Received, "1".to_string()),
                (Direction::Received, "2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn inbound_surfaces_transport_errors() {
        let inner = futures::stream::iter(vec![Err::<u32, _>(Status::cancelled("gone"))]);
        let mut inbound = Intercepted::new(
            StreamInbound::new(inner),
            INFO,
            Arc::new(Recorder::default()),
        );

        match inbound.recv().await {
            Err(Error::Transport(status)) => assert_eq!(status.code(), tonic::Code::Cancelled),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn outbound_observes_then_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        let recorder = Arc::new(Recorder::default());
        let mut outbound = Intercepted::new(ResponseSink::new(tx), INFO, recorder.clone());

        outbound.send("hello".to_string()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(
            *recorder.messages.lock(),
            vec![(Direction::Sent, "\"hello\"".to_string())]
        );
    }

    #[tokio::test]
    async fn response_sink_reports_cancellation_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel::<core::result::Result<u32, Status>>(1);
        drop(rx);
        let mut sink = ResponseSink::new(tx);

        assert!(matches!(sink.send(7).await, Err(Error::RequestCancelled)));
    }

    #[tokio::test]
    async fn request_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        let mut sink = RequestSink::new(tx);

        assert!(matches!(
            sink.send(7).await,
            Err(Error::ChannelError { .. })
        ));
    }
}
