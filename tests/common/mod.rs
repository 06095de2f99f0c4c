//! Scripted WebSocket JSON-RPC server for integration tests.
//!
//! Each accepted connection plays one script. Connection `n` uses
//! `scripts[n]`, and connections past the end of the list reuse the last
//! script. Every text frame the client sends is recorded per connection.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use logsub::{Client, ClientConfig, Event};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

pub const ADDRESS: &str = "B4FMCpibTGdZhxHHNgWWnwk5PhhKdST37uFRY6TVksaj";

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum Step {
    /// Read frames until a `logsSubscribe` request arrives.
    ExpectSubscribe,
    /// Acknowledge the last subscribe request with this subscription id.
    Ack(u64),
    /// Answer the last subscribe request with a JSON-RPC error.
    Reject(i64, &'static str),
    /// Send a `logsNotification` tagged with this subscription id.
    Notify(u64, Value),
    /// Send a text frame verbatim.
    Raw(&'static str),
    /// Send a close frame and drop the connection.
    Close,
    /// Keep reading (and recording) until the client goes away.
    Hold,
}

pub struct MockServer {
    pub url: String,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl MockServer {
    pub async fn start(scripts: Vec<Vec<Step>>) -> Self {
        assert!(!scripts.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let count = connections.clone();
        let frames = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = count.fetch_add(1, Ordering::SeqCst);
                let script = scripts[index.min(scripts.len() - 1)].clone();
                frames.lock().unwrap().push(Vec::new());
                tokio::spawn(play(stream, script, index, frames.clone()));
            }
        });

        Self {
            url,
            connections,
            received,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Frames received on connection `index`.
    pub fn received(&self, index: usize) -> Vec<Value> {
        self.received
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Subscribe requests received on connection `index`.
    pub fn subscribes(&self, index: usize) -> Vec<Value> {
        self.received(index)
            .into_iter()
            .filter(|v| v["method"] == "logsSubscribe")
            .collect()
    }
}

async fn play(
    stream: TcpStream,
    script: Vec<Step>,
    index: usize,
    received: Arc<Mutex<Vec<Vec<Value>>>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let mut last_id = Value::Null;

    for step in script {
        match step {
            Step::ExpectSubscribe => loop {
                let Some(frame) = read_text(&mut ws).await else {
                    return;
                };
                record(&received, index, frame.clone());
                if frame["method"] == "logsSubscribe" {
                    last_id = frame["id"].clone();
                    break;
                }
            },
            Step::Ack(sub) => {
                send(&mut ws, json!({"jsonrpc": "2.0", "result": sub, "id": last_id})).await;
            }
            Step::Reject(code, message) => {
                let reply = json!({
                    "jsonrpc": "2.0",
                    "error": {"code": code, "message": message},
                    "id": last_id,
                });
                send(&mut ws, reply).await;
            }
            Step::Notify(sub, result) => {
                let note = json!({
                    "jsonrpc": "2.0",
                    "method": "logsNotification",
                    "params": {"result": result, "subscription": sub},
                });
                send(&mut ws, note).await;
            }
            Step::Raw(text) => {
                let _ = ws.send(Message::Text(text.to_string())).await;
            }
            Step::Close => {
                let _ = ws.close(None).await;
                return;
            }
            Step::Hold => break,
        }
    }

    while let Some(frame) = read_text(&mut ws).await {
        record(&received, index, frame);
    }
}

async fn read_text(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    let _ = ws.send(Message::Text(value.to_string())).await;
}

fn record(received: &Arc<Mutex<Vec<Vec<Value>>>>, index: usize, frame: Value) {
    if let Some(frames) = received.lock().unwrap().get_mut(index) {
        frames.push(frame);
    }
}

/// A logs notification payload with one log line.
pub fn logs_payload(slot: u64, line: &str) -> Value {
    json!({
        "context": {"slot": slot},
        "value": {"signature": format!("sig{}", slot), "err": null, "logs": [line]},
    })
}

/// Client settings scaled down for tests.
pub fn test_config(url: &str) -> ClientConfig {
    ClientConfig::mentions(url, ADDRESS)
        .reconnect_delay(Duration::from_millis(10), Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(2))
        .subscribe_timeout(Duration::from_secs(2))
        .idle_timeout(Duration::from_secs(10))
        .ping_interval(None)
}

/// Read events until one matches `done`, returning all of them in order.
pub async fn events_until(client: &Client, mut done: impl FnMut(&Event) -> bool) -> Vec<Event> {
    let mut seen = Vec::new();
    let collect = async {
        while let Some(event) = client.next_event().await {
            let stop = done(&event);
            seen.push(event);
            if stop {
                return;
            }
        }
    };
    if tokio::time::timeout(WAIT, collect).await.is_err() {
        panic!("timed out waiting for event; got {:?}", seen);
    }
    seen
}

/// Poll `check` until it holds or `WAIT` runs out.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Subscription ids of the notifications in `events`.
pub fn delivered_ids(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Notification(n) => Some(n.subscription.0),
            _ => None,
        })
        .collect()
}
