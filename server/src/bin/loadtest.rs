//! Load test for the duck basketball relay.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the relay and wait for `assign_id`
//! - Periodically send `player_update` (and now and then `player_shoot`)
//! - Count relayed messages and `player_left` notifications
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --update-rate R  Position updates per second per client (default: 20)
//!   --url URL        Relay URL (default: ws://127.0.0.1:8080)

use duckball_shared::{ClientMsg, ServerMsg, PROTOCOL_VERSION};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// One in this many updates is followed by a shot.
const SHOOT_EVERY: u64 = 40;

// === Metrics ===

struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    updates_received: AtomicU64,
    shots_received: AtomicU64,
    players_left_received: AtomicU64,
    messages_sent: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            updates_received: AtomicU64::new(0),
            shots_received: AtomicU64::new(0),
            players_left_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

/// Tally a frame from the relay.
fn record(text: &str, metrics: &Metrics) {
    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
    if let Ok(msg) = serde_json::from_str::<ServerMsg>(text) {
        if matches!(msg, ServerMsg::PlayerLeft { .. }) {
            metrics.players_left_received.fetch_add(1, Ordering::Relaxed);
        }
        return;
    }
    if let Ok(msg) = serde_json::from_str::<ClientMsg>(text) {
        let counter = match msg {
            ClientMsg::PlayerUpdate { .. } => &metrics.updates_received,
            ClientMsg::PlayerShoot => &metrics.shots_received,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    update_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    // Wait for assign_id before doing anything else
    let assigned = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(msg @ ServerMsg::AssignId { .. }) = serde_json::from_str(&text) {
                        return Some(msg.id());
                    }
                    record(&text, &metrics);
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await;

    let player_id = match assigned {
        Ok(Some(id)) => id,
        _ => {
            if client_id < 3 {
                eprintln!("Client {} never got an id", client_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    };
    if client_id < 3 {
        eprintln!("Client {} is player {}", client_id, player_id);
    }

    let update_interval = if update_rate > 0.0 {
        Duration::from_secs_f64(1.0 / update_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };

    let mut update_timer = tokio::time::interval(update_interval);
    update_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    let mut tick: u64 = 0;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = update_timer.tick() => {
                tick += 1;
                // Walk a circle around the court
                let angle = (tick as f64 * 0.05) + client_id as f64;
                let mut outgoing = vec![ClientMsg::PlayerUpdate {
                    x: angle.cos() * 6.0,
                    y: 0.0,
                    z: angle.sin() * 3.0,
                }];
                if tick % SHOOT_EVERY == 0 {
                    outgoing.push(ClientMsg::PlayerShoot);
                }

                for msg in outgoing {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(_) => continue,
                    };
                    if ws.send(Message::Text(json.into())).await.is_ok() {
                        metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                    } else {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => record(&text, &metrics),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut update_rate: f64 = 20.0;
    let mut url = "ws://127.0.0.1:8080".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--update-rate" => {
                i += 1;
                update_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Duck Basketball Relay Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Update rate: {}/s per client", update_rate);
    println!("URL: {}", url);
    println!("Protocol version: {}", PROTOCOL_VERSION);
    println!();

    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, update_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            println!(
                "[{:3}s] connected={}, recv={}, updates={}, shots={}, left={}, sent={}, errors={}",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.updates_received.load(Ordering::Relaxed),
                metrics_clone.shots_received.load(Ordering::Relaxed),
                metrics_clone.players_left_received.load(Ordering::Relaxed),
                metrics_clone.messages_sent.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    println!();
    println!("=== Final Results ===");
    let received = metrics.messages_received.load(Ordering::Relaxed);
    let updates = metrics.updates_received.load(Ordering::Relaxed);
    let sent = metrics.messages_sent.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", received);
    println!("Total player_update received: {}", updates);
    println!(
        "Total player_shoot received: {}",
        metrics.shots_received.load(Ordering::Relaxed)
    );
    println!(
        "Total player_left received: {}",
        metrics.players_left_received.load(Ordering::Relaxed)
    );
    println!("Total messages sent: {}", sent);
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    // Every update fans out to the other clients.
    let expected = sent as f64 * num_clients.saturating_sub(1) as f64;
    println!();
    println!(
        "Messages/sec (received): {:.0}",
        received as f64 / duration_secs.max(1) as f64
    );
    if expected > 0.0 {
        println!("Fan-out delivery rate: {:.1}%", received as f64 / expected * 100.0);
    }
}
