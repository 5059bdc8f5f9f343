#![doc = include_str!("../README.md")]

use anyhow::Context;
use clap::Parser;
use core::time::Duration;
use ordermgt_core::{
    intercept::{CallInfo, CallKind, InboundStream, Interceptor, OutboundSink, RequestSink, StreamInbound},
    proto::{Order, OrderId, SearchQuery, order_management_client::OrderManagementClient},
    types::{methods, metadata},
};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, transport::Channel};
use tonic_types::StatusExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Walks through every `OrderManagement` RPC against a running server.
#[derive(Parser, Debug, Clone)]
#[command(name = "ordermgt-client", version)]
struct CliArgs {
    /// Server endpoint.
    ///
    /// Environment variable: `ORDERMGT_ADDR`
    #[arg(long, env = "ORDERMGT_ADDR", default_value_t = String::from("http://localhost:50051"))]
    addr: String,

    /// Deadline, in milliseconds, shared by the whole walkthrough.
    ///
    /// Environment variable: `ORDERMGT_DEADLINE_MS`
    #[arg(long, env = "ORDERMGT_DEADLINE_MS", default_value_t = 2000)]
    deadline_ms: u64,
}

/// Every call made by the demo runs against one absolute deadline.
#[derive(Clone, Copy)]
struct Deadline(Instant);

impl Deadline {
    fn request<T>(self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(self.0.saturating_duration_since(Instant::now()));
        request
    }

    /// Bounds a client-side streaming section. The request timeout only
    /// covers the call up to its response headers.
    async fn bound<T>(
        self,
        section: impl Future<Output = ordermgt_core::Result<T>>,
    ) -> ordermgt_core::Result<T> {
        timeout_at(self.0, section)
            .await
            .map_err(|_| ordermgt_core::Error::DeadlineExceeded)?
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;

    let channel = Channel::from_shared(args.addr.clone())?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    let mut client = OrderManagementClient::new(channel);
    let interceptor = Interceptor::tracing();
    let deadline = Deadline(Instant::now() + Duration::from_millis(args.deadline_ms));

    add_orders(&mut client, &interceptor, deadline).await?;
    get_order(&mut client, &interceptor, deadline).await?;
    search_orders(&mut client, &interceptor, deadline).await?;
    update_orders(&mut client, &interceptor, deadline).await?;
    process_orders(&mut client, &interceptor, deadline).await?;

    Ok(())
}

fn new_order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        items: vec!["iPhone XS".to_string(), "Mac Book Pro".to_string()],
        description: "Sample order description.".to_string(),
        price: 2300.0,
        destination: "San Jose, CA".to_string(),
    }
}

async fn add_orders(
    client: &mut OrderManagementClient<Channel>,
    interceptor: &Interceptor,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let info = CallInfo::client(methods::ADD_ORDER, CallKind::Unary);

    let confirmation = interceptor
        .unary(info, deadline.request(new_order("101")), |req| client.add_order(req))
        .await?;
    tracing::info!("AddOrder response: {}", confirmation.get_ref().value);

    // The reserved id is rejected with a field violation.
    match interceptor
        .unary(info, deadline.request(new_order("-1")), |req| client.add_order(req))
        .await
    {
        Ok(response) => tracing::warn!("Invalid order accepted: {}", response.get_ref().value),
        Err(status) => {
            tracing::info!(code = ?status.code(), "Invalid order rejected: {}", status.message());
            if let Some(bad_request) = status.get_error_details().bad_request() {
                for violation in &bad_request.field_violations {
                    tracing::info!(
                        "Request field invalid: {}: {}",
                        violation.field,
                        violation.description
                    );
                }
            }
        }
    }

    let mut request = deadline.request(new_order("107"));
    request.metadata_mut().append(
        metadata::TIMESTAMP,
        metadata::timestamp_now()
            .parse()
            .context("timestamp is not valid metadata")?,
    );
    request.metadata_mut().append("kn", "v1".parse()?);
    let response = interceptor
        .unary(info, request, |req| client.add_order(req))
        .await?;
    for key in [metadata::LOCATION, metadata::TIMESTAMP] {
        if let Some(value) = response.metadata().get(key) {
            tracing::info!("AddOrder header {key}: {}", value.to_str().unwrap_or("<binary>"));
        }
    }

    Ok(())
}

async fn get_order(
    client: &mut OrderManagementClient<Channel>,
    interceptor: &Interceptor,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let info = CallInfo::client(methods::GET_ORDER, CallKind::Unary);
    let order = interceptor
        .unary(
            info,
            deadline.request(OrderId {
                value: "106".to_string(),
            }),
            |req| client.get_order(req),
        )
        .await?;
    tracing::info!("GetOrder response: {:?}", order.get_ref());
    Ok(())
}

async fn search_orders(
    client: &mut OrderManagementClient<Channel>,
    interceptor: &Interceptor,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let info = CallInfo::client(methods::SEARCH_ORDERS, CallKind::ServerStreaming);
    let query = SearchQuery {
        value: "Google".to_string(),
    };
    interceptor.stream_opened(&info, Some(&query));

    let response = client.search_orders(deadline.request(query)).await?;
    if let Some(location) = response.metadata().get(metadata::LOCATION) {
        tracing::info!("SearchOrders header location: {:?}", location);
    }

    let mut inbound = interceptor.wrap(info, StreamInbound::new(response.into_inner()));
    let result = deadline
        .bound(async {
            let mut found = 0;
            while let Some(order) = inbound.recv().await? {
                tracing::info!("Search result: {:?}", order);
                found += 1;
            }
            Ok::<_, ordermgt_core::Error>(found)
        })
        .await;
    interceptor.stream_closed(&info, &result);
    tracing::info!("SearchOrders returned {} orders", result?);

    let mut stream = inbound.into_inner().into_inner();
    let trailers = deadline
        .bound(async { Ok::<_, ordermgt_core::Error>(stream.trailers().await?) })
        .await?;
    if let Some(timestamp) = trailers.as_ref().and_then(|t| t.get(metadata::TIMESTAMP)) {
        tracing::info!("SearchOrders trailer timestamp: {:?}", timestamp);
    }
    Ok(())
}

async fn update_orders(
    client: &mut OrderManagementClient<Channel>,
    interceptor: &Interceptor,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let info = CallInfo::client(methods::UPDATE_ORDERS, CallKind::ClientStreaming);
    let updates = [
        Order {
            id: "102".to_string(),
            items: vec!["Google Pixel 3A".to_string(), "Google Pixel Book".to_string()],
            destination: "Mountain View, CA".to_string(),
            price: 1100.0,
            ..Default::default()
        },
        Order {
            id: "103".to_string(),
            items: vec!["Apple Watch S4".to_string(), "Mac Book Pro".to_string(), "iPad Pro".to_string()],
            destination: "San Jose, CA".to_string(),
            price: 2800.0,
            ..Default::default()
        },
        Order {
            id: "104".to_string(),
            items: vec!["Google Home Mini".to_string(), "Google Nest Hub".to_string(), "iPad Mini".to_string()],
            destination: "Mountain View, CA".to_string(),
            price: 2200.0,
            ..Default::default()
        },
    ];

    interceptor.stream_opened(&info, None);
    let (tx, rx) = mpsc::channel(updates.len());
    let mut outbound = interceptor.wrap(info, RequestSink::new(tx));
    let call = client.update_orders(deadline.request(ReceiverStream::new(rx)));

    for order in updates {
        outbound.send(order).await?;
    }
    // Dropping the sink half-closes the request stream.
    drop(outbound);

    let result = call.await;
    interceptor.stream_closed(&info, &result);
    tracing::info!("UpdateOrders response: {}", result?.get_ref().value);
    Ok(())
}

async fn process_orders(
    client: &mut OrderManagementClient<Channel>,
    interceptor: &Interceptor,
    deadline: Deadline,
) -> anyhow::Result<()> {
    let info = CallInfo::client(methods::PROCESS_ORDERS, CallKind::Bidirectional);
    interceptor.stream_opened(&info, None);

    let (tx, rx) = mpsc::channel(4);
    let mut outbound = interceptor.wrap(info, RequestSink::new(tx));
    let response = client
        .process_orders(deadline.request(ReceiverStream::new(rx)))
        .await?;
    let mut inbound = interceptor.wrap(info, StreamInbound::new(response.into_inner()));

    let sender = tokio::spawn(async move {
        for id in ["102", "103", "104"] {
            outbound
                .send(OrderId {
                    value: id.to_string(),
                })
                .await?;
        }
        sleep(Duration::from_millis(200)).await;
        outbound
            .send(OrderId {
                value: "101".to_string(),
            })
            .await?;
        // Half-close once `outbound` drops here.
        Ok::<_, ordermgt_core::Error>(())
    });

    let result = deadline
        .bound(async {
            let mut shipments = 0;
            while let Some(shipment) = inbound.recv().await? {
                tracing::info!(
                    "Combined shipment {} ({}): {} orders",
                    shipment.id,
                    shipment.status,
                    shipment.orders_list.len()
                );
                shipments += 1;
            }
            Ok::<_, ordermgt_core::Error>(shipments)
        })
        .await;
    interceptor.stream_closed(&info, &result);

    sender.await??;
    tracing::info!("ProcessOrders returned {} shipments", result?);
    Ok(())
}
