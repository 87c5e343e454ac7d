use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "beans-mcp")]
#[command(about = "Expose a beans workspace to automated clients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (HTTP + WebSocket). Without --workspace or beans.workspace, the workspace is taken from the first client's roots, else the current directory.
    Serve {
        /// Config file path (default: BEANS_MCP_CONFIG_PATH or ~/.beans-mcp/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket and HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,

        /// Workspace root; disables discovery from client roots.
        #[arg(long, short, value_name = "DIR")]
        workspace: Option<std::path::PathBuf>,
    },

    /// Print the operation definitions as JSON.
    Tools,

    /// Call one operation through a running gateway and print its result.
    Call {
        /// Config file path (default: BEANS_MCP_CONFIG_PATH or ~/.beans-mcp/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Operation name, e.g. beans_list
        name: String,

        /// Arguments as a JSON object
        #[arg(long, short, value_name = "JSON", default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("beans-mcp {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve {
            config,
            port,
            workspace,
        }) => {
            if let Err(e) = run_serve(config, port, workspace).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Tools) => match serde_json::to_string_pretty(&beans_mcp::ops::definitions()) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                log::error!("tools failed: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Call { config, name, args }) => match run_call(config, &name, &args).await {
            Ok(payload) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
                );
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    workspace: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let (mut config, path) = beans_mcp::config::load_config(config_path)?;
    log::debug!("config loaded from {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    if workspace.is_some() {
        config.beans.workspace = workspace;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    beans_mcp::gateway::run_gateway(config).await
}

/// Read text frames until the response to `id` arrives. Events are skipped.
async fn await_response<S>(ws: &mut S, id: &str) -> Result<serde_json::Value, String>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| e.to_string())?;
        let Message::Text(text) = msg else { continue };
        let res: serde_json::Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        if res.get("type").and_then(|v| v.as_str()) != Some("res") {
            continue;
        }
        if res.get("id").and_then(|v| v.as_str()) != Some(id) {
            continue;
        }
        if !res.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let kind = res.get("errorKind").and_then(|v| v.as_str()).unwrap_or("error");
            let err = res
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("request failed");
            return Err(format!("{}: {}", kind, err));
        }
        return Ok(res.get("payload").cloned().unwrap_or(serde_json::Value::Null));
    }
    Err("gateway closed the connection".to_string())
}

async fn run_call(
    config_path: Option<std::path::PathBuf>,
    name: &str,
    args: &str,
) -> Result<serde_json::Value, String> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).map_err(|e| format!("--args is not JSON: {}", e))?;
    let (config, _) = beans_mcp::config::load_config(config_path).map_err(|e| e.to_string())?;
    let bind = config.gateway.bind.trim();
    let port = config.gateway.port;
    let token = beans_mcp::config::resolve_gateway_token(&config);
    let ws_url = format!("ws://{}:{}/ws", bind, port);

    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .map_err(|e| format!("connecting to {}: {}", ws_url, e))?;

    let mut connect_params = serde_json::json!({
        "client": { "id": "beans-mcp-cli", "version": env!("CARGO_PKG_VERSION") },
        "auth": {}
    });
    if let Some(ref t) = token {
        connect_params["auth"] = serde_json::json!({ "token": t });
    }
    let connect_req = serde_json::json!({
        "type": "req",
        "id": "1",
        "method": "connect",
        "params": connect_params
    });
    ws.send(Message::Text(connect_req.to_string()))
        .await
        .map_err(|e| e.to_string())?;
    await_response(&mut ws, "1").await?;

    let call_req = serde_json::json!({
        "type": "req",
        "id": "2",
        "method": "tools.call",
        "params": { "name": name, "arguments": arguments }
    });
    ws.send(Message::Text(call_req.to_string()))
        .await
        .map_err(|e| e.to_string())?;
    let payload = await_response(&mut ws, "2").await;
    let _ = ws.close(None).await;
    payload
}
