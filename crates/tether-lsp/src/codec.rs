//! JSON-RPC 2.0 message codec.
//!
//! Messages travel over a duplex channel as whole JSON texts. Byte-stream
//! transports (stdio) additionally wrap each text in a `Content-Length`
//! header, see [`frame_message`] and [`read_frame`].
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::LspError;

/// A JSON-RPC message (request, response, or notification).
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Has both `id` and `method`.
    Request {
        id: i64,
        method: String,
        params: Value,
    },
    /// Has `id` but no `method`.
    Response {
        id: i64,
        result: Option<Value>,
        error: Option<RpcError>,
    },
    /// Has `method` but no `id`.
    Notification { method: String, params: Value },
}

/// An error object in a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Serialize a request.
pub fn serialize_request(id: i64, method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
    .to_string()
}

/// Serialize a notification (no `id`).
pub fn serialize_notification(method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
    .to_string()
}

/// Serialize a successful response.
pub fn serialize_response(id: i64, result: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Serialize an error response.
pub fn serialize_error_response(id: i64, code: i64, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
    .to_string()
}

/// Parse one JSON-RPC message.
///
/// Fails with [`LspError::Serialization`] on invalid JSON, and with
/// [`LspError::InvalidMessage`] on a message with neither `id` nor `method`, on a
/// non-integer `id` and on a non-string `method`.
pub fn parse_message(text: &str) -> Result<JsonRpcMessage, LspError> {
    let env: Envelope = serde_json::from_str(text)?;

    let id = match env.id {
        Some(id) => Some(
            id.as_i64()
                .ok_or_else(|| LspError::InvalidMessage(format!("id must be an integer, got {id}")))?,
        ),
        None => None,
    };
    let method = match env.method {
        Some(Value::String(m)) => Some(m),
        Some(other) => {
            return Err(LspError::InvalidMessage(format!(
                "method must be a string, got {other}"
            )))
        }
        None => None,
    };
    let params = env.params.unwrap_or(Value::Null);

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessage::Request { id, method, params }),
        (Some(id), None) => {
            let error = match env.error {
                Some(Value::Null) | None => None,
                Some(raw) => Some(
                    serde_json::from_value::<RpcError>(raw.clone()).unwrap_or(RpcError {
                        code: 0,
                        message: raw.to_string(),
                    }),
                ),
            };
            Ok(JsonRpcMessage::Response {
                id,
                result: env.result,
                error,
            })
        }
        (None, Some(method)) => Ok(JsonRpcMessage::Notification { method, params }),
        (None, None) => Err(LspError::InvalidMessage(
            "message has neither id nor method".to_string(),
        )),
    }
}

/// Largest body [`read_frame`] will accept.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Wrap a message body in a `Content-Length` header.
pub fn frame_message(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut bytes = Vec::with_capacity(header.len() + body.len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

/// Read one `Content-Length` framed body from a byte stream.
///
/// `Ok(None)` means clean end of stream. Header blocks without a
/// `Content-Length` are skipped. A declared length above
/// [`MAX_FRAME_BYTES`] fails with an `InvalidData` I/O error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, LspError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                if name.trim().eq_ignore_ascii_case("Content-Length") {
                    content_length = value.trim().parse().ok();
                }
            }
        }

        let Some(length) = content_length else {
            tracing::debug!("frame without Content-Length, skipping");
            continue;
        };

        if length > MAX_FRAME_BYTES {
            return Err(LspError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame of {length} bytes exceeds limit of {MAX_FRAME_BYTES}"),
            )));
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        match String::from_utf8(body) {
            Ok(text) => return Ok(Some(text)),
            Err(_) => tracing::debug!("frame body is not UTF-8, skipping"),
        }
    }
}
