//! Conversation simulator: posts bridge `message` events to a running gateway.
//! Several counterparties each send a short burst, so greet-once and per-conversation
//! ordering can be checked in the gateway log (dry-run mode logs every reply).
//! Run with gateway up: cargo run --bin simulate [-- http://host:port]

use futures_util::future::join_all;
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
const CONVERSATIONS: usize = 6;
const MESSAGES_PER_CONVERSATION: usize = 4;

// First message of each burst is answered with the greeting, the rest by the assistant.
const MESSAGES: &[&str] = &[
    "Hey, are you around?",
    "Where did you study?",
    "What's the best email to reach you?",
    "Can you send me the slides from last week?",
    "Is the Saturday plan still on?",
    "What do you do for work these days?",
];

#[tokio::main]
async fn main() {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let token = std::env::var("AUTOREPLY_BRIDGE__TOKEN").ok();

    println!(
        "[SIMULATE] {} conversations × {} messages = {} events",
        CONVERSATIONS,
        MESSAGES_PER_CONVERSATION,
        CONVERSATIONS * MESSAGES_PER_CONVERSATION
    );
    println!("[SIMULATE] Target: {}/bridge/events (ensure gateway is running)", base_url);

    let accepted = Arc::new(AtomicU32::new(0));
    let rejected = Arc::new(AtomicU32::new(0));
    let latencies: Arc<RwLock<Vec<u64>>> = Arc::new(RwLock::new(Vec::new()));
    let client = Client::new();

    let bursts = (0..CONVERSATIONS).map(|n| {
        let client = client.clone();
        let url = format!("{}/bridge/events", base_url.trim_end_matches('/'));
        let token = token.clone();
        let accepted = Arc::clone(&accepted);
        let rejected = Arc::clone(&rejected);
        let latencies = Arc::clone(&latencies);

        async move {
            let from = format!("1555000{:04}@c.us", n);
            for m in 0..MESSAGES_PER_CONVERSATION {
                let body = json!({
                    "type": "message",
                    "from": from,
                    "from_me": false,
                    "body": MESSAGES[(n + m) % MESSAGES.len()],
                });

                let mut req = client.post(&url).json(&body);
                if let Some(t) = token.as_deref() {
                    req = req.header(autoreply_core::BRIDGE_TOKEN_HEADER, t);
                }

                let start = Instant::now();
                match req.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        accepted.fetch_add(1, Ordering::Relaxed);
                        latencies
                            .write()
                            .await
                            .push(start.elapsed().as_millis() as u64);
                    }
                    Ok(resp) => {
                        eprintln!("[SIMULATE] {} rejected: HTTP {}", from, resp.status());
                        rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        eprintln!("[SIMULATE] {} failed: {}", from, e);
                        rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });
    join_all(bursts).await;

    let a = accepted.load(Ordering::Relaxed);
    let r = rejected.load(Ordering::Relaxed);
    let latencies = latencies.read().await;
    let avg_latency_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
    };

    println!(
        "[SIMULATE] Accepted: {} | Rejected: {} | Average Latency: {:.0}ms",
        a, r, avg_latency_ms
    );
    println!(
        "[SIMULATE] Expect {} greetings in the gateway log, one per conversation.",
        CONVERSATIONS
    );
}
