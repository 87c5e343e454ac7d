//! Gateway HTTP + WebSocket server (single port).

use crate::backend::{Backend, MutableDelegate, ProcessBackend, ProcessSettings};
use crate::config::{self, Config};
use crate::gateway::protocol::{
    ConnectParams, FrameHeader, HelloOk, RootsListResult, ServerInfo, ToolCallParams, WsRequest,
    WsResponse,
};
use crate::ops;
use crate::workspace::{resolve_workspace, select_workspace, RootsOutcome, RootsProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const PROTOCOL_VERSION: u32 = 1;

/// Frames queued per connection before senders wait.
const OUTBOUND_QUEUE: usize = 64;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

/// Client event announcing that its roots changed.
const ROOTS_CHANGED_EVENT: &str = "roots.listChanged";

/// Builds the backend for a workspace root; called again whenever the workspace changes.
pub type BackendFactory = Arc<dyn Fn(PathBuf) -> Arc<dyn Backend> + Send + Sync>;

/// Factory producing [`ProcessBackend`]s configured from `config`.
pub fn process_factory(config: &Config) -> BackendFactory {
    let config = config.clone();
    Arc::new(move |workspace: PathBuf| {
        let backend: Arc<dyn Backend> =
            Arc::new(ProcessBackend::new(ProcessSettings::from_config(&config, workspace)));
        backend
    })
}

/// Build connect.challenge event JSON (nonce + ts). Sent as the first frame after WS open.
fn connect_challenge_event(nonce: &str, ts_ms: u64) -> String {
    serde_json::to_string(&json!({
        "type": "event",
        "event": "connect.challenge",
        "payload": { "nonce": nonce, "ts": ts_ms }
    }))
    .unwrap_or_else(|_| r#"{"type":"event","event":"connect.challenge","payload":{}}"#.to_string())
}

/// When auth mode is token and a token is configured, returns it for connect validation.
fn require_connect_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

fn frame<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Shared state for the gateway (config, backend, workspace discovery).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, WebSocket connect must provide params.auth.token matching this.
    pub required_token: Option<String>,
    /// Broadcasts events to connected clients (e.g. shutdown). Subscribers receive JSON event frames.
    pub event_tx: broadcast::Sender<String>,
    /// Every operation goes through this; discovery swaps what it forwards to.
    pub backend: Arc<MutableDelegate>,
    pub factory: BackendFactory,
    /// Workspace came from `--workspace` or `beans.workspace`; client roots are never consulted.
    pub explicit_workspace: bool,
    /// Set once a client-declared root has been installed.
    pub discovered: Arc<AtomicBool>,
}

impl GatewayState {
    /// Pick the starting workspace (explicit, else `cwd`) and install its backend.
    pub fn new(config: Config, factory: BackendFactory, cwd: &Path) -> Self {
        let explicit = config.beans.workspace.as_ref().map(|w| cwd.join(w));
        let workspace = select_workspace(explicit.as_deref(), None, cwd);
        log::info!(
            "workspace {} ({})",
            workspace.display(),
            if explicit.is_some() { "explicit" } else { "default" }
        );
        let backend = Arc::new(MutableDelegate::new(factory(workspace)));
        let (event_tx, _) = broadcast::channel(64);
        Self {
            required_token: require_connect_token(&config),
            config: Arc::new(config),
            event_tx,
            backend,
            factory,
            explicit_workspace: explicit.is_some(),
            discovered: Arc::new(AtomicBool::new(false)),
        }
    }

    fn workspace_source(&self) -> &'static str {
        if self.explicit_workspace {
            "explicit"
        } else if self.discovered.load(Ordering::SeqCst) {
            "discovered"
        } else {
            "default"
        }
    }

    /// Resolve the client's roots and install a backend for the first local one.
    /// Without `refresh`, only the first successful discovery across all clients applies.
    async fn discover_workspace(&self, provider: ClientRoots, refresh: bool) {
        let Some(path) = resolve_workspace(&provider).await else {
            return;
        };
        let already = self.discovered.swap(true, Ordering::SeqCst);
        if already && !refresh {
            log::debug!("workspace already discovered; ignoring {}", path.display());
            return;
        }
        if self.backend.workspace() == path {
            return;
        }
        self.backend.set_inner((self.factory)(path));
    }
}

/// Run the gateway with the beans CLI backend until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let factory = process_factory(&config);
    run_gateway_with(config, factory).await
}

/// Run the gateway with backends built by `factory`.
pub async fn run_gateway_with(config: Config, factory: BackendFactory) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or BEANS_MCP_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let cwd = std::env::current_dir().context("reading current directory")?;
    let port = config.gateway.port;
    let state = GatewayState::new(config, factory, &cwd);
    let event_tx = state.event_tx.clone();

    let app = Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event to WebSocket clients before the server drains.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("could not install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("could not install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and draining connections");

    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
    }))
}

/// GET /ws upgrades to WebSocket. First request must be connect; we reply with hello-ok.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Server-initiated requests awaiting the client's response, by request id.
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<WsResponse>>>>;

fn lock_pending(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<WsResponse>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Asks one connected client for its roots over the socket.
struct ClientRoots {
    supported: bool,
    outbound: mpsc::Sender<String>,
    pending: Pending,
    timeout: Duration,
}

#[async_trait]
impl RootsProvider for ClientRoots {
    async fn list_roots(&self) -> Result<RootsOutcome> {
        if !self.supported {
            return Ok(RootsOutcome::Unsupported);
        }
        let id = format!("srv-{}", uuid::Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), tx);

        let req = WsRequest::new(&id, "roots.list", json!({}));
        if self.outbound.send(frame(&req)).await.is_err() {
            lock_pending(&self.pending).remove(&id);
            anyhow::bail!("connection closed before roots.list was sent");
        }
        let res = match tokio::time::timeout(self.timeout, rx).await {
            Err(_) => {
                lock_pending(&self.pending).remove(&id);
                anyhow::bail!("no answer to roots.list within {:?}", self.timeout);
            }
            Ok(Err(_)) => anyhow::bail!("connection closed before roots.list was answered"),
            Ok(Ok(res)) => res,
        };
        if !res.ok {
            anyhow::bail!(
                "client rejected roots.list: {}",
                res.error.unwrap_or_default()
            );
        }
        let result: RootsListResult =
            serde_json::from_value(res.payload.unwrap_or_else(|| json!({})))
                .context("invalid roots.list result")?;
        Ok(RootsOutcome::Roots(result.roots))
    }
}

/// Per-connection context shared by the reader loop and spawned request tasks.
struct Connection {
    state: GatewayState,
    outbound: mpsc::Sender<String>,
    pending: Pending,
    roots_supported: bool,
}

impl Connection {
    async fn reply(&self, res: WsResponse) {
        let _ = self.outbound.send(frame(&res)).await;
    }

    fn roots_provider(&self) -> ClientRoots {
        ClientRoots {
            supported: self.roots_supported,
            outbound: self.outbound.clone(),
            pending: self.pending.clone(),
            timeout: Duration::from_millis(self.state.config.gateway.roots_timeout_ms),
        }
    }

    fn spawn_discovery(&self, refresh: bool) {
        if self.state.explicit_workspace {
            return;
        }
        let state = self.state.clone();
        let provider = self.roots_provider();
        tokio::spawn(async move { state.discover_workspace(provider, refresh).await });
    }

    /// Validate connect params and auth; Ok carries the hello-ok payload.
    fn connect(&mut self, params: serde_json::Value) -> Result<HelloOk, WsResponse> {
        let params: ConnectParams = serde_json::from_value(params)
            .map_err(|e| WsResponse::protocol_err("", format!("invalid connect params: {}", e)))?;
        if let Some(ref required) = self.state.required_token {
            let provided = params.auth.token.as_deref().unwrap_or("").trim();
            if provided.is_empty() {
                return Err(WsResponse::err(
                    "",
                    "unauthorized",
                    "unauthorized: gateway token missing (set BEANS_MCP_GATEWAY_TOKEN or gateway.auth.token)",
                ));
            }
            if provided != required {
                return Err(WsResponse::err("", "unauthorized", "unauthorized: gateway token mismatch"));
            }
        }
        if params.min_protocol.map_or(false, |min| min > PROTOCOL_VERSION) {
            return Err(WsResponse::protocol_err(
                "",
                format!("unsupported protocol (server speaks {})", PROTOCOL_VERSION),
            ));
        }
        self.roots_supported = params.capabilities.roots.is_some();
        log::debug!(
            "client connected: {} (roots: {})",
            params.client.id.as_deref().unwrap_or("unknown"),
            self.roots_supported
        );
        Ok(HelloOk {
            typ: "hello-ok".to_string(),
            protocol: params.max_protocol.unwrap_or(PROTOCOL_VERSION).min(PROTOCOL_VERSION),
            server: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            workspace: self.state.backend.workspace().display().to_string(),
        })
    }

    fn status(&self) -> serde_json::Value {
        let auth_mode = if self.state.required_token.is_some() {
            "token"
        } else {
            "none"
        };
        json!({
            "runtime": "running",
            "protocol": PROTOCOL_VERSION,
            "port": self.state.config.gateway.port,
            "bind": self.state.config.gateway.bind,
            "auth": auth_mode,
            "workspace": self.state.backend.workspace().display().to_string(),
            "workspaceSource": self.state.workspace_source(),
            "operations": ops::definitions().len(),
        })
    }
}

/// Run one `tools.call` to completion and queue its response.
async fn call_tool(backend: Arc<MutableDelegate>, outbound: mpsc::Sender<String>, req: WsRequest) {
    let params: ToolCallParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => {
            let res = WsResponse::protocol_err(&req.id, format!("invalid tools.call params: {}", e));
            let _ = outbound.send(frame(&res)).await;
            return;
        }
    };
    let res = match ops::execute(backend.as_ref(), &params.name, params.arguments).await {
        Ok(payload) => WsResponse::ok(&req.id, payload),
        Err(e) => {
            log::debug!("{} failed ({}): {}", params.name, e.kind(), e);
            WsResponse::err(&req.id, e.kind(), e.to_string())
        }
    };
    let _ = outbound.send(frame(&res)).await;
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let mut event_rx = state.event_tx.subscribe();

    // Single writer; spawned request tasks hold senders, so their replies still go out after the reader stops.
    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let nonce = uuid::Uuid::new_v4().to_string();
    let ts_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    if out_tx.send(connect_challenge_event(&nonce, ts_ms)).await.is_err() {
        return;
    }

    let mut conn = Connection {
        state,
        outbound: out_tx,
        pending: Arc::new(Mutex::new(HashMap::new())),
        roots_supported: false,
    };
    let mut connected = false;

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = conn.outbound.send(text).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(header) = serde_json::from_str::<FrameHeader>(&text) else { continue };

                match header.typ.as_str() {
                    "res" => {
                        let Ok(res) = serde_json::from_str::<WsResponse>(&text) else { continue };
                        match lock_pending(&conn.pending).remove(&res.id) {
                            Some(waiter) => { let _ = waiter.send(res); }
                            None => log::debug!("response for unknown request {}", res.id),
                        }
                        continue;
                    }
                    "event" => {
                        let event = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(str::to_string));
                        if connected && event.as_deref() == Some(ROOTS_CHANGED_EVENT) {
                            conn.spawn_discovery(true);
                        }
                        continue;
                    }
                    "req" => {}
                    _ => continue,
                }

                let req: WsRequest = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        conn.reply(WsResponse::protocol_err("", format!("malformed request: {}", e))).await;
                        continue;
                    }
                };

                if req.method != "connect" && !connected {
                    conn.reply(WsResponse::protocol_err(&req.id, "not connected: send connect first")).await;
                    continue;
                }

                match req.method.as_str() {
                    "connect" => {
                        if connected {
                            conn.reply(WsResponse::protocol_err(&req.id, "already connected")).await;
                            continue;
                        }
                        match conn.connect(req.params) {
                            Ok(hello) => {
                                let payload = serde_json::to_value(&hello).unwrap_or(json!({}));
                                conn.reply(WsResponse::ok(&req.id, payload)).await;
                                connected = true;
                                if !conn.state.discovered.load(Ordering::SeqCst) {
                                    conn.spawn_discovery(false);
                                }
                            }
                            Err(mut res) => {
                                res.id = req.id;
                                conn.reply(res).await;
                            }
                        }
                    }
                    "health" => {
                        let payload = json!({
                            "runtime": "running",
                            "protocol": PROTOCOL_VERSION,
                        });
                        conn.reply(WsResponse::ok(&req.id, payload)).await;
                    }
                    "status" => {
                        conn.reply(WsResponse::ok(&req.id, conn.status())).await;
                    }
                    "tools.list" => {
                        let payload = json!({ "tools": ops::definitions() });
                        conn.reply(WsResponse::ok(&req.id, payload)).await;
                    }
                    "tools.call" => {
                        tokio::spawn(call_tool(
                            conn.state.backend.clone(),
                            conn.outbound.clone(),
                            req,
                        ));
                    }
                    _ => {
                        let res = WsResponse::protocol_err(&req.id, format!("unknown method: {}", req.method));
                        conn.reply(res).await;
                    }
                }
            }
        }
    }

    // Wake any discovery still waiting on this client.
    lock_pending(&conn.pending).clear();
    if !connected {
        log::debug!("ws client disconnected before sending connect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn memory_factory() -> BackendFactory {
        Arc::new(|workspace: PathBuf| {
            let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(workspace));
            backend
        })
    }

    fn provider_for(state: &GatewayState, supported: bool) -> ClientRoots {
        let (tx, _rx) = mpsc::channel(1);
        ClientRoots {
            supported,
            outbound: tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout: Duration::from_millis(state.config.gateway.roots_timeout_ms),
        }
    }

    #[test]
    fn explicit_workspace_resolves_against_cwd() {
        let mut config = Config::default();
        config.beans.workspace = Some(PathBuf::from("proj"));
        let state = GatewayState::new(config, memory_factory(), Path::new("/home/u"));
        assert!(state.explicit_workspace);
        assert_eq!(state.backend.workspace(), PathBuf::from("/home/u/proj"));
        assert_eq!(state.workspace_source(), "explicit");

        let state = GatewayState::new(Config::default(), memory_factory(), Path::new("/home/u"));
        assert_eq!(state.backend.workspace(), PathBuf::from("/home/u"));
        assert_eq!(state.workspace_source(), "default");
    }

    #[tokio::test]
    async fn unsupported_client_keeps_default_workspace() {
        let state = GatewayState::new(Config::default(), memory_factory(), Path::new("/cwd"));
        let provider = provider_for(&state, false);
        assert_eq!(provider.list_roots().await.unwrap(), RootsOutcome::Unsupported);
        state.discover_workspace(provider, false).await;
        assert_eq!(state.backend.workspace(), PathBuf::from("/cwd"));
        assert!(!state.discovered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn closed_connection_fails_roots_request() {
        let state = GatewayState::new(Config::default(), memory_factory(), Path::new("/cwd"));
        // Receiver dropped: the request cannot be sent.
        let provider = provider_for(&state, true);
        assert!(provider.list_roots().await.is_err());
        state.discover_workspace(provider_for(&state, true), false).await;
        assert_eq!(state.backend.workspace(), PathBuf::from("/cwd"));
    }
}
