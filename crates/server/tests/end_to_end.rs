use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use triplex_client::{PublisherClient, RpcClient, SubscriberClient};
use triplex_server::{Server, ServerConfig};
use wincode_derive::{SchemaRead, SchemaWrite};

#[derive(Debug, PartialEq, SchemaRead, SchemaWrite)]
struct Echo(String);

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), port))
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: StdDuration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(StdDuration::from_millis(5));
    }
    cond()
}

/// S1 — round-trip RPC: `echo("Hello world")` returns `"Hello world"`.
#[test]
fn echo_round_trip() {
    let endpoint = addr(24901);
    let server = Server::start(ServerConfig::new().listen(endpoint)).unwrap();
    server.bind_fn("echo", |Echo(s)| Echo(s));

    let client = RpcClient::connect(endpoint);
    let reply: Echo = client.call("echo", Echo("Hello world".to_string())).unwrap();
    assert_eq!(reply, Echo("Hello world".to_string()));
}

/// S2 — void RPC: `say_hello()` runs the handler exactly once and
/// returns an empty body.
#[test]
fn void_rpc_runs_handler_once() {
    let endpoint = addr(24902);
    let server = Server::start(ServerConfig::new().listen(endpoint)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    server.bind_raw("say_hello", move |_body| {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    });

    let client = RpcClient::connect(endpoint);
    let body = client.call_raw("say_hello", Vec::new()).unwrap();
    assert!(body.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// S3 — publish/subscribe fan-out: two subscribers both see a publish;
/// cancelling one leaves only the other receiving.
#[test]
fn publish_fans_out_to_subscribers() {
    let endpoint = addr(24903);
    let _server = Server::start(ServerConfig::new().listen(endpoint)).unwrap();

    let received_a: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let received_b: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    let sub_a = SubscriberClient::connect(endpoint);
    let store_a = received_a.clone();
    sub_a.subscribe("weather", move |body| store_a.lock().unwrap().push(body.to_vec())).unwrap();

    let sub_b = SubscriberClient::connect(endpoint);
    let store_b = received_b.clone();
    sub_b.subscribe("weather", move |body| store_b.lock().unwrap().push(body.to_vec())).unwrap();

    let publisher = PublisherClient::connect(endpoint);
    assert!(wait_until(|| publisher.publish_raw("weather", b"good".to_vec()).is_ok(), StdDuration::from_secs(2)));

    assert!(wait_until(|| !received_a.lock().unwrap().is_empty(), StdDuration::from_secs(2)));
    assert!(wait_until(|| !received_b.lock().unwrap().is_empty(), StdDuration::from_secs(2)));
    assert_eq!(received_a.lock().unwrap().last().unwrap(), b"good");
    assert_eq!(received_b.lock().unwrap().last().unwrap(), b"good");

    sub_b.unsubscribe("weather").unwrap();
    thread::sleep(StdDuration::from_millis(100));

    publisher.publish_raw("weather", b"good".to_vec()).unwrap();
    assert!(wait_until(|| received_a.lock().unwrap().len() == 2, StdDuration::from_secs(2)));
    thread::sleep(StdDuration::from_millis(200));
    assert_eq!(received_b.lock().unwrap().len(), 1);
}

/// S4 — unsubscribe removes the topic entry; later publishes don't
/// reach the client, and the server's registry no longer lists it.
#[test]
fn unsubscribe_stops_delivery_and_clears_registry() {
    let endpoint = addr(24904);
    let server = Server::start(ServerConfig::new().listen(endpoint)).unwrap();

    let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sub = SubscriberClient::connect(endpoint);
    let store = received.clone();
    sub.subscribe("news", move |body| store.lock().unwrap().push(body.to_vec())).unwrap();

    assert!(wait_until(|| server.subscriber_count("news") == 1, StdDuration::from_secs(2)));

    sub.unsubscribe("news").unwrap();
    assert!(wait_until(|| server.subscriber_count("news") == 0, StdDuration::from_secs(2)));

    let publisher = PublisherClient::connect(endpoint);
    publisher.publish_raw("news", b"breaking".to_vec()).unwrap();
    thread::sleep(StdDuration::from_millis(200));
    assert!(received.lock().unwrap().is_empty());
}

/// S5 — an over-large payload is rejected by the client before any
/// byte leaves the socket; no server is even needed for this case.
#[test]
fn oversized_payload_rejected_client_side() {
    let endpoint = addr(24905);
    let client = RpcClient::connect_with_timeout(endpoint, triplex_timing::Duration::from_millis(50));
    let oversized = vec![0u8; triplex_net::tcp::frame::MAX_BUFFER_LEN + 1];
    let err = client.call_raw("big", oversized).unwrap_err();
    assert!(matches!(err, triplex_client::ClientError::SendTooLarge { .. }));
}

/// S6 — a subscriber whose heartbeat cadence stays under the server's
/// idle timeout keeps its subscription across multiple timeout windows;
/// a connection that never sends anything gets evicted instead.
#[test]
fn heartbeat_keeps_subscription_alive_past_idle_timeout() {
    let endpoint = addr(24906);
    let server =
        Server::start(ServerConfig::new().listen(endpoint).timeout(triplex_timing::Duration::from_millis(120)))
            .unwrap();

    let sub = SubscriberClient::connect_with_config(
        triplex_client::ClientConfig::new(endpoint).heartbeats(triplex_timing::Duration::from_millis(30)),
    );
    sub.subscribe("weather", |_body| {}).unwrap();

    assert!(wait_until(|| server.subscriber_count("weather") == 1, StdDuration::from_secs(2)));
    thread::sleep(StdDuration::from_millis(400));
    assert_eq!(server.subscriber_count("weather"), 1);
}
