//! Load testing for hub fan-out.

use std::time::{Duration, Instant};

use relay_sdk::RelayClient;
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_broadcast_fan_out() {
    let relay = common::start_relay(28520).await;

    // 1. Open sessions
    let sessions = 50;
    let messages = 20;
    let mut client = RelayClient::new(&relay.base_url());
    client.login("load", "pw").await.unwrap();

    let mut connections = Vec::with_capacity(sessions);
    for _ in 0..sessions {
        connections.push(client.connect_hub("/hub").await.unwrap());
    }
    assert!(
        common::eventually(Duration::from_secs(5), || relay.hub.session_count() == sessions).await
    );

    // 2. Each session counts the load messages it receives
    let mut tasks = Vec::new();
    for mut connection in connections {
        tasks.push(tokio::spawn(async move {
            let mut received = 0;
            let mut latencies = Vec::new();
            let start = Instant::now();
            while received < messages {
                let next = tokio::time::timeout(
                    Duration::from_secs(10),
                    connection.next_invocation("ReceiveMessage"),
                )
                .await;
                match next {
                    Ok(Ok(Some(args))) => {
                        let is_load = args
                            .first()
                            .and_then(Value::as_str)
                            .is_some_and(|s| s.starts_with("load-"));
                        if is_load {
                            received += 1;
                            latencies.push(start.elapsed());
                        }
                    }
                    _ => break,
                }
            }
            latencies
        }));
    }

    // 3. Broadcast
    let start = Instant::now();
    for i in 0..messages {
        let delivered = relay.hub.send_to_all(json!(format!("load-{}", i))).unwrap();
        assert_eq!(delivered, sessions);
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        let latencies = task.await.unwrap();
        assert_eq!(latencies.len(), messages);
        all_latencies.extend(latencies);
    }
    let duration = start.elapsed();

    all_latencies.sort();
    let total = sessions * messages;
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Fan-out Results ---");
    println!("Sessions:       {}", sessions);
    println!("Deliveries:     {}", total);
    println!("Total Duration: {:?}", duration);
    println!("Deliveries/sec: {:.2}", total as f64 / duration.as_secs_f64());
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-----------------------\n");

    relay.host.stop().await.unwrap();
    assert_eq!(relay.hub.session_count(), 0);
}
