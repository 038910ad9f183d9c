//! End-to-end tests of the pub/sub fabric: publisher, caching proxy and
//! subscriber wired over real sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mist_daemon::shutdown::Shutdown;
use mist_daemon::transport::{run_proxy, run_publisher, start_client};
use mist_protocol::PUBSUB_TOPIC;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn spawn_publisher(
    port: u16,
    interval_sec: f64,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    let counter = Arc::new(AtomicU32::new(0));
    tokio::spawn(async move {
        let _ = run_publisher(port, interval_sec, 0, PUBSUB_TOPIC, shutdown, move || {
            let seq = counter.fetch_add(1, Ordering::SeqCst);
            Some(format!("{{\"seq\":{seq}}}"))
        })
        .await;
    })
}

#[tokio::test]
async fn test_subscriber_receives_in_emission_order() {
    let port = free_port();
    let shutdown = Shutdown::new();

    let publisher = spawn_publisher(port, 0.1, shutdown.clone());

    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    start_client("127.0.0.1", port, PUBSUB_TOPIC, 3, shutdown.clone(), move |payload| {
        sink.lock().unwrap().push(payload.to_string());
    })
    .await
    .unwrap();

    shutdown.trigger();
    let _ = publisher.await;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 3);
    let seqs: Vec<i64> = received
        .iter()
        .map(|p| serde_json::from_str::<serde_json::Value>(p).unwrap()["seq"].as_i64().unwrap())
        .collect();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1], "out of order: {seqs:?}");
    }
}

#[tokio::test]
async fn test_late_subscriber_gets_cached_message_quickly() {
    let real_port = free_port();
    let proxy_port = free_port();
    let shutdown = Shutdown::new();

    // Publisher with a long interval: exactly one emission up front. It is
    // given a head start so the proxy's first connect attempt lands inside
    // the publisher's first-subscriber window.
    let publisher = spawn_publisher(real_port, 60.0, shutdown.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    let proxy_shutdown = shutdown.clone();
    let proxy = tokio::spawn(async move {
        let _ = run_proxy("127.0.0.1", real_port, proxy_port, 0, 0, proxy_shutdown).await;
    });

    // Give the pipeline time to emit and cache the first message.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // A subscriber connecting now must see the cached message well before
    // the next periodic emission.
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let connect_at = Instant::now();
    start_client(
        "127.0.0.1",
        proxy_port,
        PUBSUB_TOPIC,
        1,
        shutdown.clone(),
        move |payload| {
            sink.lock().unwrap().push(payload.to_string());
        },
    )
    .await
    .unwrap();
    let latency = connect_at.elapsed();

    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(
        latency < Duration::from_millis(700),
        "cache replay took {latency:?}"
    );

    shutdown.trigger();
    let _ = publisher.await;
    let _ = proxy.await;
}

#[tokio::test]
async fn test_early_subscriber_sees_live_traffic_without_cache() {
    let real_port = free_port();
    let proxy_port = free_port();
    let shutdown = Shutdown::new();

    let proxy_shutdown = shutdown.clone();
    let proxy = tokio::spawn(async move {
        let _ = run_proxy("127.0.0.1", real_port, proxy_port, 0, 0, proxy_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Subscriber connects before the publisher exists: empty cache, so the
    // first delivery is the first live message.
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let sub_shutdown = shutdown.clone();
    let subscriber = tokio::spawn(async move {
        start_client(
            "127.0.0.1",
            proxy_port,
            PUBSUB_TOPIC,
            1,
            sub_shutdown,
            move |payload| {
                sink.lock().unwrap().push(payload.to_string());
            },
        )
        .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let publisher = spawn_publisher(real_port, 0.1, shutdown.clone());

    tokio::time::timeout(Duration::from_secs(5), subscriber)
        .await
        .expect("subscriber should finish")
        .unwrap()
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].contains("seq"));

    shutdown.trigger();
    let _ = publisher.await;
    let _ = proxy.await;
}

#[tokio::test]
async fn test_proxy_idle_timeout_after_first_payload() {
    let real_port = free_port();
    let proxy_port = free_port();
    let shutdown = Shutdown::new();

    // One emission, then the publisher goes silent for good.
    let pub_shutdown = Shutdown::new();
    let publisher = {
        let pub_shutdown = pub_shutdown.clone();
        tokio::spawn(async move {
            let _ = run_publisher(real_port, 600.0, 0, PUBSUB_TOPIC, pub_shutdown, || {
                Some("{\"seq\":0}".to_string())
            })
            .await;
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let proxy_result = tokio::time::timeout(
        Duration::from_secs(10),
        run_proxy("127.0.0.1", real_port, proxy_port, 0, 1, shutdown.clone()),
    )
    .await;

    // The proxy terminated on its own via the idle timeout, armed only
    // after the first cached payload.
    assert!(proxy_result.is_ok(), "proxy did not time out on idle");
    assert!(started.elapsed() >= Duration::from_secs(1));

    pub_shutdown.trigger();
    shutdown.trigger();
    let _ = publisher.await;
}

#[tokio::test]
async fn test_subscriber_filters_other_topics() {
    let port = free_port();
    let shutdown = Shutdown::new();

    // Publisher emits on a different topic than the subscriber filters.
    let counter = Arc::new(AtomicU32::new(0));
    let publisher = {
        let shutdown = shutdown.clone();
        let counter = counter.clone();
        tokio::spawn(async move {
            let _ = run_publisher(port, 0.1, 0, "other_topic", shutdown, move || {
                let seq = counter.fetch_add(1, Ordering::SeqCst);
                Some(format!("{{\"seq\":{seq}}}"))
            })
            .await;
        })
    };

    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let sub_shutdown = shutdown.clone();
    let subscriber = tokio::spawn(async move {
        start_client("127.0.0.1", port, PUBSUB_TOPIC, 1, sub_shutdown, move |payload| {
            sink.lock().unwrap().push(payload.to_string());
        })
        .await
    });

    // The subscriber listens on the control topic while the publisher uses
    // another one: nothing may arrive.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(received.lock().unwrap().is_empty());

    shutdown.trigger();
    let _ = subscriber.await;
    let _ = publisher.await;
}
