#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use server::config::Config;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for any single frame.
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// A server running in this process on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Config::local()).await
    }

    pub async fn start_with(config: Config) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            server::serve(listener, config).await.expect("Server error");
        });
        Self {
            addr,
            client: Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Creates a match and returns the response body.
    pub async fn create_match(&self, body: Value) -> Value {
        let resp = self.post("/api/matches", body).await;
        assert_eq!(resp.status(), 201);
        resp.json().await.expect("Invalid create response")
    }

    /// A 5x5 standard match between two humans: returns (match id, token 1, token 2).
    pub async fn two_player_match(&self) -> (String, String, String) {
        let created = self.create_match(json!({ "config": standard_5x5(), "name": "ann" })).await;
        let match_id = created["matchId"].as_str().unwrap().to_string();
        let joined: Value = self
            .post(&format!("/api/matches/{match_id}/join"), json!({ "name": "bo" }))
            .await
            .json()
            .await
            .unwrap();
        (
            match_id,
            created["token"].as_str().unwrap().to_string(),
            joined["token"].as_str().unwrap().to_string(),
        )
    }

    /// Opens a match socket and consumes the welcome frame.
    pub async fn seat(&self, match_id: &str, token: Option<&str>) -> Ws {
        let path = match token {
            Some(token) => format!("/ws/matches/{match_id}?token={token}"),
            None => format!("/ws/matches/{match_id}"),
        };
        let mut ws = self.connect(&path).await;
        let welcome = recv_type(&mut ws, "welcome").await;
        assert!(welcome["socketId"].is_u64());
        ws
    }

    pub async fn connect(&self, path: &str) -> Ws {
        let (ws, _) = connect_async(self.ws_url(path))
            .await
            .expect("WebSocket connect failed");
        ws
    }
}

pub fn standard_5x5() -> Value {
    json!({ "variant": "standard", "boardWidth": 5, "boardHeight": 5 })
}

pub fn cat_move(row: usize, col: usize) -> Value {
    json!({ "type": "submit-move", "move": { "actions": [{ "type": "cat-move", "target": [row, col] }] } })
}

pub async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON text frame, or `None` once the socket closes.
pub async fn next_json(ws: &mut Ws) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Frame is not JSON"))
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("WebSocket error: {e}"),
        }
    }
}

/// Skips frames until one satisfies `pred`.
pub async fn recv_until(ws: &mut Ws, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let msg = next_json(ws).await.expect("Socket closed early");
        if pred(&msg) {
            return msg;
        }
    }
}

pub async fn recv_type(ws: &mut Ws, kind: &str) -> Value {
    recv_until(ws, |m| m["type"] == kind).await
}

/// Waits for a `state` frame whose history has `plies` entries.
pub async fn recv_state_at(ws: &mut Ws, plies: usize) -> Value {
    recv_until(ws, |m| {
        m["type"] == "state" && m["state"]["history"].as_array().map(Vec::len) == Some(plies)
    })
    .await
}
