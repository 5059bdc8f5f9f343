//! gRPC service implementation for order management.
//!
//! This module defines [`OrderService`], the concrete implementation of the
//! [`OrderManagement`] service from the protobuf schema.
//!
//! ## Responsibilities
//!
//! - Run every handler behind the [`Interceptor`]: unary pre/post hooks, and
//!   open/close hooks plus per-message observation for streams.
//! - Spawn one task per server-streaming or bidirectional call, feeding a
//!   bounded response channel.
//! - Attach header and trailer metadata.
//! - End streaming calls with `DEADLINE_EXCEEDED` once the caller's
//!   `grpc-timeout` runs out.
//! - Refuse new streams and stop running ones on shutdown.

use crate::server::{
    config::ServerConfig,
    service::{
        metadata::{insert_location, insert_timestamp, request_deadline, timestamp_trailer},
        tracker::{StreamGuard, StreamTracker},
        unary,
    },
    store::OrderStore,
    streaming::{aggregator, search, update},
    telemetry::{increment_requests, increment_stream_errors},
};
use core::pin::Pin;
use ordermgt_core::{
    Error,
    intercept::{CallInfo, CallKind, Interceptor, ResponseSink, StreamInbound},
    proto::{
        CombinedShipment, Confirmation, Order, OrderId, SearchQuery,
        order_management_server::OrderManagement,
    },
    types::{methods, metadata::SEARCH_LOCATION},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Response, Status, Streaming};

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// gRPC order management service.
///
/// Cheap to clone; clones share the store, the interceptor and the stream
/// tracker.
#[derive(Clone, Debug)]
pub struct OrderService {
    config: ServerConfig,
    store: Arc<OrderStore>,
    interceptor: Interceptor,
    tracker: Arc<StreamTracker>,
}

impl OrderService {
    /// Creates the service with a fresh store, seeded according to
    /// `config.seed_sample_data`, and the logging interceptor.
    pub fn new(config: ServerConfig) -> Self {
        let store = if config.seed_sample_data {
            OrderStore::with_sample_data()
        } else {
            OrderStore::new()
        };
        Self::with_parts(config, Arc::new(store), Interceptor::default())
    }

    pub fn with_parts(config: ServerConfig, store: Arc<OrderStore>, interceptor: Interceptor) -> Self {
        Self {
            config,
            store,
            interceptor,
            tracker: Arc::new(StreamTracker::new()),
        }
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<StreamTracker> {
        &self.tracker
    }

    /// Refuses new streams, waits up to `shutdown_timeout` seconds for the
    /// running ones, then cancels whatever is left.
    pub async fn shutdown(&self) {
        self.tracker
            .shutdown(Duration::from_secs(self.config.shutdown_timeout))
            .await;
    }

    fn begin_stream(&self, info: &CallInfo) -> Result<StreamGuard, Status> {
        increment_requests(info.method);
        self.tracker.begin().map_err(|e| {
            increment_stream_errors();
            Status::from(e)
        })
    }
}

/// Resolves once `deadline` passes; pending forever without one.
async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => core::future::pending().await,
    }
}

/// Runs a spawned stream body to completion and reports its result.
///
/// The body is abandoned when the client drops the response stream, the
/// caller's deadline passes or the service shuts down. Failures other than
/// client cancellation are sent to the client as the final status; a
/// successful body may end with trailers.
async fn drive<T, R, W>(
    work: W,
    info: CallInfo,
    interceptor: Interceptor,
    status_tx: mpsc::Sender<Result<T, Status>>,
    shutdown: CancellationToken,
    deadline: Option<Instant>,
    with_trailer: bool,
) where
    W: Future<Output = ordermgt_core::Result<R>> + Send,
    R: core::fmt::Debug,
{
    let result = tokio::select! {
        () = shutdown.cancelled() => Err(Error::ServiceShutdown),
        () = status_tx.closed() => Err(Error::RequestCancelled),
        () = expired(deadline) => Err(Error::DeadlineExceeded),
        result = work => result,
    };
    interceptor.stream_closed(&info, &result);

    match result {
        Ok(_summary) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(method = info.method, summary = ?_summary, "Stream completed");
            if with_trailer {
                let trailer = Status::with_metadata(Code::Ok, "", timestamp_trailer());
                let _ = status_tx.send(Err(trailer)).await;
            }
        }
        Err(Error::RequestCancelled) => {
            increment_stream_errors();
            #[cfg(feature = "tracing")]
            tracing::debug!(method = info.method, "Client went away");
        }
        Err(e) => {
            increment_stream_errors();
            #[cfg(feature = "tracing")]
            tracing::warn!(method = info.method, "Stream failed: {e}");
            let _ = status_tx.send(Err(e.into())).await;
        }
    }
}

fn spawn_stream<F>(fut: F, _method: &'static str)
where
    F: Future<Output = ()> + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        fut.instrument(tracing::info_span!("streaming", method = _method))
    };

    tokio::spawn(fut);
}

#[tonic::async_trait]
impl OrderManagement for OrderService {
    type SearchOrdersStream = ResponseStream<Order>;
    type ProcessOrdersStream = ResponseStream<CombinedShipment>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(order_id = %request.get_ref().id)))]
    async fn add_order(&self, request: Request<Order>) -> Result<Response<Confirmation>, Status> {
        increment_requests(methods::ADD_ORDER);
        let info = CallInfo::server(methods::ADD_ORDER, CallKind::Unary);
        self.interceptor
            .unary(info, request, |request| async move {
                unary::add_order(&self.store, self.config.require_metadata, request)
                    .map_err(Status::from)
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(order_id = %request.get_ref().value)))]
    async fn get_order(&self, request: Request<OrderId>) -> Result<Response<Order>, Status> {
        increment_requests(methods::GET_ORDER);
        let info = CallInfo::server(methods::GET_ORDER, CallKind::Unary);
        self.interceptor
            .unary(info, request, |request| async move {
                Ok(unary::get_order(&self.store, request))
            })
            .await
    }

    /// Streams every order with an item matching the query.
    ///
    /// Headers carry `location` and `timestamp`; the trailer carries a
    /// second `timestamp` taken when the stream ends.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(query = %request.get_ref().value)))]
    async fn search_orders(
        &self,
        request: Request<SearchQuery>,
    ) -> Result<Response<Self::SearchOrdersStream>, Status> {
        let info = CallInfo::server(methods::SEARCH_ORDERS, CallKind::ServerStreaming);
        let guard = self.begin_stream(&info)?;
        self.interceptor.stream_opened(&info, Some(request.get_ref()));

        let deadline = request_deadline(request.metadata());
        let query = request.into_inner().value;
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let status_tx = resp_tx.clone();
        let mut outbound = self.interceptor.wrap(info, ResponseSink::new(resp_tx));
        let store = Arc::clone(&self.store);

        let work = async move { search::search_orders(&store, &query, &mut outbound).await };
        let interceptor = self.interceptor.clone();
        let shutdown = self.tracker.token();
        spawn_stream(
            async move {
                let _guard = guard;
                drive(work, info, interceptor, status_tx, shutdown, deadline, true).await;
            },
            info.method,
        );

        let stream: Self::SearchOrdersStream = Box::pin(ReceiverStream::new(resp_rx));
        let mut response = Response::new(stream);
        insert_location(response.metadata_mut(), SEARCH_LOCATION);
        insert_timestamp(response.metadata_mut());
        Ok(response)
    }

    /// Upserts every streamed order and confirms the ids once the client
    /// half-closes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn update_orders(
        &self,
        request: Request<Streaming<Order>>,
    ) -> Result<Response<Confirmation>, Status> {
        let info = CallInfo::server(methods::UPDATE_ORDERS, CallKind::ClientStreaming);
        let _guard = self.begin_stream(&info)?;
        self.interceptor.stream_opened(&info, None);

        let deadline = request_deadline(request.metadata());
        let mut inbound = self
            .interceptor
            .wrap(info, StreamInbound::new(request.into_inner()));
        let shutdown = self.tracker.token();

        let result = tokio::select! {
            () = shutdown.cancelled() => Err(Error::ServiceShutdown),
            () = expired(deadline) => Err(Error::DeadlineExceeded),
            result = update::update_orders(&self.store, &mut inbound) => result,
        };
        self.interceptor.stream_closed(&info, &result);

        let updated = result.map_err(|e| {
            increment_stream_errors();
            Status::from(e)
        })?;
        Ok(Response::new(Confirmation {
            value: update::confirmation(&updated),
        }))
    }

    /// Aggregates streamed order ids into combined shipments.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn process_orders(
        &self,
        request: Request<Streaming<OrderId>>,
    ) -> Result<Response<Self::ProcessOrdersStream>, Status> {
        let info = CallInfo::server(methods::PROCESS_ORDERS, CallKind::Bidirectional);
        let guard = self.begin_stream(&info)?;
        self.interceptor.stream_opened(&info, None);

        let deadline = request_deadline(request.metadata());
        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let status_tx = resp_tx.clone();
        let mut inbound = self
            .interceptor
            .wrap(info, StreamInbound::new(request.into_inner()));
        let mut outbound = self.interceptor.wrap(info, ResponseSink::new(resp_tx));
        let store = Arc::clone(&self.store);
        let policy = self.config.batch_policy;

        let work = async move {
            aggregator::process_orders(&store, policy, &mut inbound, &mut outbound).await
        };
        let interceptor = self.interceptor.clone();
        let shutdown = self.tracker.token();
        spawn_stream(
            async move {
                let _guard = guard;
                drive(work, info, interceptor, status_tx, shutdown, deadline, false).await;
            },
            info.method,
        );

        let stream: Self::ProcessOrdersStream = Box::pin(ReceiverStream::new(resp_rx));
        Ok(Response::new(stream))
    }
}
