//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.beans-mcp/config.json`) and environment.
//! Every field has a default, so a missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exec::{EnvPolicy, DEFAULT_ENV_ALLOWLIST, DEFAULT_ENV_PREFIX};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// How the beans CLI is located and invoked.
    #[serde(default)]
    pub beans: BeansConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,

    /// How long to wait for a client's answer to `roots.list` (default 5000 ms).
    #[serde(default = "default_roots_timeout_ms")]
    pub roots_timeout_ms: u64,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback). "token" = require connect.auth.token.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for WebSocket connect. Overridden by BEANS_MCP_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require connect.auth.token to match configured token.
    Token,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_roots_timeout_ms() -> u64 {
    5_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
            roots_timeout_ms: default_roots_timeout_ms(),
        }
    }
}

/// beans CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeansConfig {
    /// Executable to run (default "beans", resolved through PATH).
    #[serde(default = "default_beans_binary")]
    pub binary: PathBuf,

    /// Explicit workspace root. When unset the root is discovered from the client, then the current directory.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Wall-clock limit per invocation (default 30000 ms).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ceiling on captured stdout/stderr per invocation (default 10 MiB).
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Inherited variables passed to the CLI. When unset, terminal/locale/home/shell/path variables.
    #[serde(default)]
    pub env_allowlist: Option<Vec<String>>,

    /// Variables with this prefix always pass through (default "BEANS_"; empty disables).
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Log file read by `beans_read_log`. Relative paths resolve against the workspace.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Directory logs may live in besides the workspace (default ~/.beans-mcp/logs).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_beans_binary() -> PathBuf {
    PathBuf::from("beans")
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

impl Default for BeansConfig {
    fn default() -> Self {
        Self {
            binary: default_beans_binary(),
            workspace: None,
            timeout_ms: default_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            env_allowlist: None,
            env_prefix: default_env_prefix(),
            log_path: None,
            log_dir: None,
        }
    }
}

impl BeansConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn env_policy(&self) -> EnvPolicy {
        let allow = self
            .env_allowlist
            .clone()
            .unwrap_or_else(|| DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect());
        EnvPolicy::new(allow, Some(self.env_prefix.clone()))
    }
}

/// Resolve the gateway token: env BEANS_MCP_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    std::env::var("BEANS_MCP_GATEWAY_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .gateway
                .auth
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BEANS_MCP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".beans-mcp").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Directory logs may be read from besides the workspace.
pub fn resolve_log_dir(config: &Config) -> PathBuf {
    config.beans.log_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".beans-mcp").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    })
}

/// Log file for a workspace: `beans.logPath` (relative to the workspace) or `<logDir>/beans.log`.
pub fn resolve_log_path(config: &Config, workspace: &Path) -> PathBuf {
    match &config.beans.log_path {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) if !p.as_os_str().is_empty() => workspace.join(p),
        _ => resolve_log_dir(config).join("beans.log"),
    }
}

/// Load config from the given path (or BEANS_MCP_CONFIG_PATH, or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
