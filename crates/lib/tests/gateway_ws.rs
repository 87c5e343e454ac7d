//! Integration test: WebSocket protocol against an in-memory backend.
//! Covers the connect handshake, roots discovery, and tool calls end to end.

use beans_mcp::backend::{Backend, MemoryBackend};
use beans_mcp::config::Config;
use beans_mcp::gateway::{self, BackendFactory};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn memory_factory() -> BackendFactory {
    Arc::new(|workspace: PathBuf| {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(workspace));
        backend
    })
}

fn start_gateway(workspace: Option<PathBuf>) -> u16 {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.roots_timeout_ms = 2_000;
    config.beans.workspace = workspace;
    tokio::spawn(async move {
        let _ = gateway::run_gateway_with(config, memory_factory()).await;
    });
    port
}

/// Test client: answers `roots.list` with `roots` and skips events while waiting for a response.
struct Client {
    ws: Ws,
    roots: Vec<String>,
    next_id: u64,
}

impl Client {
    async fn open(port: u16, roots: &[String]) -> Self {
        let url = format!("ws://127.0.0.1:{}/ws", port);
        for _ in 0..100 {
            if let Ok((ws, _)) = tokio_tungstenite::connect_async(url.as_str()).await {
                let mut client = Client {
                    ws,
                    roots: roots.to_vec(),
                    next_id: 0,
                };
                let challenge = client.next_frame().await;
                assert_eq!(challenge["event"], "connect.challenge");
                return client;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("gateway on port {} did not accept WebSocket connections within 5s", port);
    }

    async fn next_frame(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("frame within 5s")
                .expect("socket open")
                .expect("valid frame");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).expect("JSON frame");
            }
        }
    }

    async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string()))
            .await
            .expect("send frame");
    }

    async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = format!("c-{}", self.next_id);
        self.send(json!({"type": "req", "id": id, "method": method, "params": params}))
            .await;
        loop {
            let frame = self.next_frame().await;
            match frame["type"].as_str() {
                Some("res") if frame["id"] == id.as_str() => return frame,
                Some("req") if frame["method"] == "roots.list" => {
                    let roots: Vec<Value> = self.roots.iter().map(|u| json!({"uri": u})).collect();
                    let answer = json!({
                        "type": "res",
                        "id": frame["id"],
                        "ok": true,
                        "payload": {"roots": roots}
                    });
                    self.send(answer).await;
                }
                _ => {}
            }
        }
    }

    async fn connect(&mut self, with_roots: bool) -> Value {
        let capabilities = if with_roots {
            json!({"roots": {"listChanged": false}})
        } else {
            json!({})
        };
        self.request(
            "connect",
            json!({"client": {"id": "test"}, "capabilities": capabilities}),
        )
        .await
    }

    async fn call(&mut self, name: &str, arguments: Value) -> Value {
        self.request("tools.call", json!({"name": name, "arguments": arguments}))
            .await
    }
}

fn file_uri(path: &Path) -> String {
    url::Url::from_file_path(path).expect("absolute path").to_string()
}

#[tokio::test]
async fn requests_before_connect_are_rejected() {
    let port = start_gateway(None);
    let mut client = Client::open(port, &[]).await;
    let res = client.request("tools.list", json!({})).await;
    assert_eq!(res["ok"], false);
    assert_eq!(res["errorKind"], "protocol");

    let res = client.connect(false).await;
    assert_eq!(res["ok"], true);
    assert_eq!(res["payload"]["type"], "hello-ok");
    let res = client.request("connect", json!({})).await;
    assert_eq!(res["errorKind"], "protocol");
}

#[tokio::test]
async fn client_roots_select_the_workspace() {
    let root = std::env::temp_dir().join(format!("beans-mcp-roots-{}", uuid::Uuid::new_v4()));
    let port = start_gateway(None);
    let mut client = Client::open(port, &[file_uri(&root), "/second/root".to_string()]).await;
    assert_eq!(client.connect(true).await["ok"], true);

    let mut status = Value::Null;
    for _ in 0..50 {
        status = client.request("status", json!({})).await;
        if status["payload"]["workspaceSource"] == "discovered" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status["payload"]["workspaceSource"], "discovered");
    assert_eq!(status["payload"]["workspace"], root.display().to_string());

    let created = client
        .call("beans_create", json!({"title": "First", "type": "task"}))
        .await;
    assert_eq!(created["ok"], true, "{created}");
    let listed = client.call("beans_list", json!({})).await;
    assert_eq!(listed["payload"]["count"], 1);
    assert_eq!(listed["payload"]["beans"][0]["title"], "First");
}

#[tokio::test]
async fn client_without_roots_keeps_default_workspace() {
    let port = start_gateway(None);
    let mut client = Client::open(port, &[]).await;
    assert_eq!(client.connect(false).await["ok"], true);

    let tools = client.request("tools.list", json!({})).await;
    assert_eq!(tools["payload"]["tools"].as_array().map(Vec::len), Some(14));

    let status = client.request("status", json!({})).await;
    assert_eq!(status["payload"]["workspaceSource"], "default");
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(status["payload"]["workspace"], cwd.display().to_string());
}

#[tokio::test]
async fn explicit_workspace_ignores_client_roots() {
    let explicit = std::env::temp_dir().join(format!("beans-mcp-explicit-{}", uuid::Uuid::new_v4()));
    let port = start_gateway(Some(explicit.clone()));
    let mut client = Client::open(port, &["/somewhere/else".to_string()]).await;
    assert_eq!(client.connect(true).await["ok"], true);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = client.request("status", json!({})).await;
    assert_eq!(status["payload"]["workspaceSource"], "explicit");
    assert_eq!(status["payload"]["workspace"], explicit.display().to_string());
}

#[tokio::test]
async fn tool_failures_carry_error_kind() {
    let port = start_gateway(None);
    let mut client = Client::open(port, &[]).await;
    client.connect(false).await;

    let res = client
        .call("beans_read_file", json!({"path": "../../etc/passwd"}))
        .await;
    assert_eq!(res["ok"], false);
    assert_eq!(res["errorKind"], "sandbox");

    let res = client.call("beans_get", json!({"id": "missing"})).await;
    assert_eq!(res["errorKind"], "notFound");

    let res = client.call("beans_list", json!({"limit": 0})).await;
    assert_eq!(res["errorKind"], "validation");

    let res = client.call("beans_list", json!({"bogus": 1})).await;
    assert_eq!(res["errorKind"], "protocol");

    let res = client.request("no.such.method", json!({})).await;
    assert_eq!(res["errorKind"], "protocol");
}
