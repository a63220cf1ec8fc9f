//! Publish Loop Integration Tests
//!
//! Tests the periodic publisher against a mock channel:
//! - Payloads carry the running counter and publishes follow the interval
//! - Every message goes out at least-once
//! - Request failures are tolerated without ending the loop

use mqttrun::publisher::{run_publisher, PUBLISH_INTERVAL};
use mqttrun::testing::MockChannel;
use mqttrun::ShutdownSignal;
use rumqttc::QoS;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_publish_loop_numbers_and_paces_messages() {
    let channel = MockChannel::new();
    let shutdown = ShutdownSignal::new();

    let publisher = tokio::spawn(run_publisher(
        channel.clone(),
        "t/loop".to_string(),
        "tick".to_string(),
        shutdown.clone(),
    ));

    // Two and a half intervals cover exactly three iterations
    sleep(PUBLISH_INTERVAL * 2 + PUBLISH_INTERVAL / 2).await;
    shutdown.trigger();
    let delivered = publisher.await.expect("publisher task should finish");

    let published = channel.published().await;
    assert_eq!(delivered, published.len() as u64);
    let payloads: Vec<String> = published
        .iter()
        .map(|message| String::from_utf8_lossy(&message.payload).into_owned())
        .collect();
    assert_eq!(payloads, vec!["tick #1", "tick #2", "tick #3"]);
    assert!(published.iter().all(|message| message.topic == "t/loop"));
    assert!(published
        .iter()
        .all(|message| message.qos == QoS::AtLeastOnce));
}

#[tokio::test(start_paused = true)]
async fn test_publish_failures_do_not_stop_the_loop() {
    let channel = MockChannel::with_failure();
    let shutdown = ShutdownSignal::new();

    let publisher = tokio::spawn(run_publisher(
        channel.clone(),
        "t/loop".to_string(),
        "tick".to_string(),
        shutdown.clone(),
    ));

    // Several failing iterations pass without the task ending
    sleep(PUBLISH_INTERVAL * 3 + PUBLISH_INTERVAL / 2).await;
    assert!(!publisher.is_finished());

    shutdown.trigger();
    let delivered = publisher.await.expect("publisher task should finish");
    assert_eq!(delivered, 0);
    assert!(channel.published().await.is_empty());
}
