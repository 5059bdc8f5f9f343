use core::{fmt::Debug, time::Duration};
use ordermgt_core::{
    intercept::{CallInfo, CallObserver, Direction, Interceptor, Outcome},
    proto::{Order, OrderId, SearchQuery, order_management_client::OrderManagementClient},
    types::metadata::{LOCATION, TIMESTAMP},
};
use ordermgt_server::{OrderService, OrderStore, ServerConfig, build_order_service};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::mpsc, time::timeout};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Code, Request, transport::Channel, transport::Server};
use tonic_types::StatusExt;

async fn serve(service: OrderService) -> OrderManagementClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(build_order_service(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    OrderManagementClient::connect(format!("http://{addr}"))
        .await
        .unwrap()
}

async fn client() -> OrderManagementClient<Channel> {
    serve(OrderService::new(ServerConfig::default())).await
}

fn order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        items: vec!["Samsung S9".to_string()],
        description: "Mobile phone".to_string(),
        price: 700.0,
        destination: "Palo Alto, CA".to_string(),
    }
}

fn order_id(id: &str) -> OrderId {
    OrderId {
        value: id.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn add_order_replies_with_confirmation_and_headers() {
    let mut client = client().await;

    let response = client.add_order(order("101")).await.unwrap();
    assert_eq!(response.metadata().get(LOCATION).unwrap(), "San Jose");
    assert!(response.metadata().get(TIMESTAMP).is_some());
    assert_eq!(response.into_inner().value, "Order Added: 101");

    let fetched = client.get_order(order_id("101")).await.unwrap();
    assert_eq!(fetched.into_inner(), order("101"));
}

#[tokio::test(flavor = "multi_thread")]
async fn add_order_with_invalid_id_carries_field_violation() {
    let mut client = client().await;

    let status = client.add_order(order("-1")).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let details = status.get_error_details();
    let violations = &details.bad_request().unwrap().field_violations;
    assert_eq!(violations[0].field, "ID");
    assert_eq!(
        violations[0].description,
        "Order ID received is not valid -1 : Mobile phone"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn add_order_requires_metadata_when_configured() {
    let config = ServerConfig {
        require_metadata: true,
        ..ServerConfig::default()
    };
    let mut client = serve(OrderService::new(config)).await;

    let status = client.add_order(order("101")).await.unwrap_err();
    assert_eq!(status.code(), Code::DataLoss);

    let mut request = Request::new(order("101"));
    request
        .metadata_mut()
        .append(TIMESTAMP, "Jan  2 15:04:05.000000000".parse().unwrap());
    request.metadata_mut().append("kn", "v1".parse().unwrap());
    assert!(client.add_order(request).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn get_unknown_order_is_empty() {
    let mut client = client().await;
    let order = client.get_order(order_id("999")).await.unwrap();
    assert_eq!(order.into_inner(), Order::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn search_streams_matches_with_header_and_trailer() {
    let mut client = client().await;

    let response = client
        .search_orders(SearchQuery {
            value: "Google".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.metadata().get(LOCATION).unwrap(), "MTV");

    let mut stream = response.into_inner();
    let mut ids = Vec::new();
    while let Some(order) = stream.message().await.unwrap() {
        ids.push(order.id);
    }
    ids.sort();
    assert_eq!(ids, vec!["102", "104"]);

    let trailers = stream.trailers().await.unwrap().unwrap();
    assert!(trailers.get(TIMESTAMP).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn update_orders_confirms_every_id() {
    let mut client = client().await;

    let mut updated = Vec::new();
    for id in ["102", "103", "104"] {
        let mut order = order(id);
        order.description = "updated".to_string();
        updated.push(order);
    }

    let confirmation = client
        .update_orders(tokio_stream::iter(updated))
        .await
        .unwrap();
    assert_eq!(
        confirmation.into_inner().value,
        "Orders processed Updated Order IDs : 102, 103, 104, "
    );

    let fetched = client.get_order(order_id("103")).await.unwrap();
    assert_eq!(fetched.into_inner().description, "updated");
}

#[tokio::test(flavor = "multi_thread")]
async fn process_orders_flushes_once_then_closes() {
    let mut client = client().await;

    let ids = ["102", "103", "104"].map(order_id);
    let mut stream = client
        .process_orders(tokio_stream::iter(ids))
        .await
        .unwrap()
        .into_inner();

    let mut shipments = Vec::new();
    while let Some(shipment) = stream.message().await.unwrap() {
        shipments.push(shipment);
    }
    shipments.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(shipments.len(), 2);
    assert_eq!(shipments[0].id, "cmb - Mountain View, CA");
    assert_eq!(shipments[0].status, "Processed!");
    assert_eq!(shipments[0].orders_list.len(), 2);
    assert_eq!(shipments[1].id, "cmb - San Jose, CA");
    assert_eq!(shipments[1].orders_list.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn process_orders_drains_window_on_half_close() {
    let mut client = client().await;

    let ids = ["102", "103", "104", "105"].map(order_id);
    let mut stream = client
        .process_orders(tokio_stream::iter(ids))
        .await
        .unwrap()
        .into_inner();

    let mut total = 0;
    while let Some(shipment) = stream.message().await.unwrap() {
        total += shipment.orders_list.len();
    }
    assert_eq!(total, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn process_orders_rejects_unknown_ids() {
    let mut client = client().await;

    let ids = ["102", "999"].map(order_id);
    let mut stream = client
        .process_orders(tokio_stream::iter(ids))
        .await
        .unwrap()
        .into_inner();

    let status = loop {
        match stream.message().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stream ended without an error"),
            Err(status) => break status,
        }
    };
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn process_orders_ends_with_deadline_exceeded_while_client_is_silent() {
    let service = OrderService::new(ServerConfig::default());
    let tracker = service.tracker().clone();
    let mut client = serve(service).await;

    // The request stream stays open: one id, never half-closed.
    let (tx, rx) = mpsc::channel(1);
    tx.send(order_id("102")).await.unwrap();
    let mut request = Request::new(ReceiverStream::new(rx));
    request.set_timeout(Duration::from_millis(300));

    let mut stream = client.process_orders(request).await.unwrap().into_inner();
    let status = timeout(Duration::from_secs(5), stream.message())
        .await
        .expect("server kept the stream open past the deadline")
        .unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);

    for _ in 0..100 {
        if tracker.inflight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(tracker.inflight(), 0);
    drop(tx);
}

#[tokio::test(flavor = "multi_thread")]
async fn search_orders_within_deadline_still_completes() {
    let mut client = client().await;

    let mut request = Request::new(SearchQuery {
        value: "Amazon".to_string(),
    });
    request.set_timeout(Duration::from_secs(2));
    let mut stream = client.search_orders(request).await.unwrap().into_inner();

    let mut found = 0;
    while let Some(_order) = stream.message().await.unwrap() {
        found += 1;
    }
    assert_eq!(found, 2);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl CallObserver for Recorder {
    fn on_call_start(&self, info: &CallInfo, _request: Option<&dyn Debug>) {
        self.events.lock().push(format!("start {}", info.method));
    }

    fn on_message(&self, _info: &CallInfo, direction: Direction, _message: &dyn Debug) {
        self.events.lock().push(format!("{direction:?}"));
    }

    fn on_call_end(&self, info: &CallInfo, outcome: Outcome<'_>) {
        let outcome = match outcome {
            Outcome::Reply(_) => "reply",
            Outcome::Completed => "completed",
            Outcome::Failed(_) => "failed",
        };
        self.events
            .lock()
            .push(format!("end {} {outcome}", info.method));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn server_interceptor_observes_calls_and_messages() {
    let recorder = Arc::new(Recorder::default());
    let service = OrderService::with_parts(
        ServerConfig::default(),
        Arc::new(OrderStore::with_sample_data()),
        Interceptor::new(recorder.clone()),
    );
    let mut client = serve(service).await;

    client.get_order(order_id("102")).await.unwrap();
    client.add_order(order("-1")).await.unwrap_err();
    client
        .update_orders(tokio_stream::iter(vec![order("1"), order("2")]))
        .await
        .unwrap();

    let events = recorder.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "start /ecommerce.OrderManagement/GetOrder",
            "end /ecommerce.OrderManagement/GetOrder reply",
            "start /ecommerce.OrderManagement/AddOrder",
            "end /ecommerce.OrderManagement/AddOrder failed",
            "start /ecommerce.OrderManagement/UpdateOrders",
            "Received",
            "Received",
            "end /ecommerce.OrderManagement/UpdateOrders completed",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn server_interceptor_observes_process_orders() {
    let recorder = Arc::new(Recorder::default());
    let service = OrderService::with_parts(
        ServerConfig::default(),
        Arc::new(OrderStore::with_sample_data()),
        Interceptor::new(recorder.clone()),
    );
    let mut client = serve(service).await;

    let ids = ["102", "103", "104"].map(order_id);
    let mut stream = client
        .process_orders(tokio_stream::iter(ids))
        .await
        .unwrap()
        .into_inner();
    let mut shipments = 0;
    while stream.message().await.unwrap().is_some() {
        shipments += 1;
    }
    assert_eq!(shipments, 2);

    let events = recorder.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "start /ecommerce.OrderManagement/ProcessOrders",
            "Received",
            "Received",
            "Received",
            "Sent",
            "Sent",
            "end /ecommerce.OrderManagement/ProcessOrders completed",
        ]
    );
}
