//! Wire-level JSON-RPC 2.0 envelope types.
//!
//! A single shape, [`Frame`], covers all three message kinds the protocol can
//! carry in either direction: requests, responses, and notifications. Shape
//! is distinguished structurally (presence of `id`/`method`/`result`/`error`),
//! not by a discriminant field, matching the wire format itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A convenience alias used throughout the crate for untyped JSON payloads.
pub type JsonValue = Value;

/// JSON-RPC request id: either a non-negative integer or an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC error object, `{code, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.code, self.message)
    }
}

impl std::error::Error for ResponseError {}

/// Standard JSON-RPC error codes this crate issues on the inbound path.
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_CANCELLED: i64 = -32800;
}

/// An outbound or inbound request: has an `id` and a `method`.
#[derive(Debug, Clone)]
pub struct AnyRequest {
    pub id: RequestId,
    pub method: String,
    pub params: JsonValue,
}

/// A response keyed to a previously issued request id.
#[derive(Debug, Clone)]
pub struct AnyResponse {
    pub id: RequestId,
    pub payload: Result<JsonValue, ResponseError>,
}

impl AnyResponse {
    pub fn new_ok(id: RequestId, result: JsonValue) -> Self {
        Self {
            id,
            payload: Ok(result),
        }
    }

    pub fn new_err(id: RequestId, error: ResponseError) -> Self {
        Self {
            id,
            payload: Err(error),
        }
    }
}

/// A one-way message: has a `method` but no `id`.
#[derive(Debug, Clone)]
pub struct AnyNotification {
    pub method: String,
    pub params: JsonValue,
}

/// A decoded wire frame, before it is routed by the dispatcher.
#[derive(Debug, Clone)]
pub enum Frame {
    Request(AnyRequest),
    Response(AnyResponse),
    Notification(AnyNotification),
}

/// The raw, field-optional shape used to (de)serialize a frame to/from JSON.
/// Kept private: callers always go through [`Frame`].
#[derive(Debug, Serialize, Deserialize)]
struct RawMessage {
    jsonrpc: RpcVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

/// Forces `"jsonrpc": "2.0"` on the wire without carrying a runtime value for it.
#[derive(Debug)]
struct RpcVersion;

impl Serialize for RpcVersion {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for RpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let _ = String::deserialize(d)?;
        Ok(RpcVersion)
    }
}

/// Errors decoding a single wire frame. The caller (transport) logs and
/// drops the frame rather than treating this as session-fatal, per the
/// spec's "malformed frame is dropped, not fatal" contract.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message has neither method nor result/error: {0:?}")]
    Empty(JsonValue),
}

impl Frame {
    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        let raw: RawMessage = serde_json::from_slice(body)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawMessage) -> Result<Self, FrameError> {
        match (raw.id, raw.method, raw.result, raw.error) {
            (Some(id), Some(method), _, _) => Ok(Frame::Request(AnyRequest {
                id,
                method,
                params: raw.params.unwrap_or(JsonValue::Null),
            })),
            (Some(id), None, result, error) => {
                let payload = match error {
                    Some(err) => Err(err),
                    None => Ok(result.unwrap_or(JsonValue::Null)),
                };
                Ok(Frame::Response(AnyResponse { id, payload }))
            }
            (None, Some(method), _, _) => Ok(Frame::Notification(AnyNotification {
                method,
                params: raw.params.unwrap_or(JsonValue::Null),
            })),
            (None, None, _, _) => Err(FrameError::Empty(
                serde_json::to_value(&raw.params).unwrap_or(JsonValue::Null),
            )),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let raw = match self {
            Frame::Request(req) => RawMessage {
                jsonrpc: RpcVersion,
                id: Some(req.id.clone()),
                method: Some(req.method.clone()),
                params: Some(req.params.clone()),
                result: None,
                error: None,
            },
            Frame::Response(resp) => {
                let (result, error) = match &resp.payload {
                    Ok(v) => (Some(v.clone()), None),
                    Err(e) => (None, Some(e.clone())),
                };
                RawMessage {
                    jsonrpc: RpcVersion,
                    id: Some(resp.id.clone()),
                    method: None,
                    params: None,
                    result,
                    error,
                }
            }
            Frame::Notification(notif) => RawMessage {
                jsonrpc: RpcVersion,
                id: None,
                method: Some(notif.method.clone()),
                params: Some(notif.params.clone()),
                result: None,
                error: None,
            },
        };
        serde_json::to_vec(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        match Frame::decode(body).unwrap() {
            Frame::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "initialize");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn decodes_response_result() {
        let body = br#"{"jsonrpc":"2.0","id":"abc","result":{"ok":true}}"#;
        match Frame::decode(body).unwrap() {
            Frame::Response(resp) => {
                assert_eq!(resp.id, RequestId::String("abc".into()));
                assert_eq!(resp.payload.unwrap()["ok"], true);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_response_error() {
        let body = br#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#;
        match Frame::decode(body).unwrap() {
            Frame::Response(resp) => {
                let err = resp.payload.unwrap_err();
                assert_eq!(err.code, -32601);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_notification() {
        let body = br#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#;
        match Frame::decode(body).unwrap() {
            Frame::Notification(n) => assert_eq!(n.method, "textDocument/publishDiagnostics"),
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_message() {
        let body = br#"{"jsonrpc":"2.0"}"#;
        assert!(Frame::decode(body).is_err());
    }

    #[test]
    fn round_trips_request() {
        let frame = Frame::Request(AnyRequest {
            id: RequestId::Number(7),
            method: "textDocument/hover".into(),
            params: serde_json::json!({"foo": "bar"}),
        });
        let encoded = frame.encode().unwrap();
        match Frame::decode(&encoded).unwrap() {
            Frame::Request(req) => {
                assert_eq!(req.id, RequestId::Number(7));
                assert_eq!(req.params["foo"], "bar");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }
}
