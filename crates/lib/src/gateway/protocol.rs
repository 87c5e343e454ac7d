//! Gateway WebSocket protocol types (connect, tools, roots, etc.).

use serde::{Deserialize, Serialize};

use crate::workspace::Root;

/// Wire request: `{ "type": "req", "id", "method", "params" }`. Sent by either side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" + "errorKind" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Any inbound frame; only the type tag is inspected before routing.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameHeader {
    #[serde(rename = "type")]
    pub typ: String,
}

/// Client connect params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: Option<u32>,
    pub max_protocol: Option<u32>,
    #[serde(default)]
    pub client: ConnectClient,
    #[serde(default)]
    pub auth: ConnectAuth,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectClient {
    pub id: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAuth {
    pub token: Option<String>,
}

/// What the client can answer when the server asks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// Present when the client answers `roots.list`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Server hello-ok payload after successful connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    #[serde(rename = "type")]
    pub typ: String,
    pub protocol: u32,
    pub server: ServerInfo,
    /// Workspace the backend is operating against at connect time.
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Params for `tools.call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Client's answer to `roots.list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsListResult {
    #[serde(default)]
    pub roots: Vec<Root>,
}

impl WsRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            typ: "req".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl WsResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
            error_kind: None,
        }
    }

    pub fn err(id: impl Into<String>, kind: &str, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
            error_kind: Some(kind.to_string()),
        }
    }

    /// Malformed frame, unknown method, or a request before `connect`.
    pub fn protocol_err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::err(id, "protocol", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_response_carries_kind() {
        let res = WsResponse::err("7", "sandbox", "path escapes sandbox: ../x");
        let v = serde_json::to_value(&res).unwrap();
        assert_eq!(
            v,
            json!({"type": "res", "id": "7", "ok": false, "error": "path escapes sandbox: ../x", "errorKind": "sandbox"})
        );
    }

    #[test]
    fn connect_params_read_roots_capability() {
        let p: ConnectParams = serde_json::from_value(json!({
            "client": {"id": "editor"},
            "capabilities": {"roots": {"listChanged": true}}
        }))
        .unwrap();
        assert!(p.capabilities.roots.map_or(false, |r| r.list_changed));
        let p: ConnectParams = serde_json::from_value(json!({})).unwrap();
        assert!(p.capabilities.roots.is_none());
    }
}
