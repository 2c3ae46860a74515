//! JSON-RPC 2.0 envelope handling.
//!
//! Messages stay as `serde_json::Value` until routed: a request is only
//! decoded far enough to find its method, correlation id and params.

use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const UNAUTHORIZED: i64 = -32001;
    pub const PERMISSION_DENIED: i64 = -32003;
    pub const NOT_FOUND: i64 = -32004;
}

/// Protocol-level failure: the call could not be serviced at all.
///
/// Tool-level failures never use this type; they travel as successful
/// results carrying `isError: true`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn permission_denied(tool: &str) -> Self {
        Self::new(
            codes::PERMISSION_DENIED,
            format!("Permission denied for tool '{tool}'"),
        )
        .with_data(json!({ "tool": tool }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    pub fn not_initialized() -> Self {
        Self::invalid_request("session not initialized")
    }

    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A validated inbound message that carries a method.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// `None` marks a notification: no reply is ever produced.
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

impl Incoming {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outcome of decoding one element of a JSON-RPC payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Incoming),
    /// Envelope was malformed; reply with this error.
    Rejected(Value),
    /// A client-side response or other method-less message; nothing to do.
    Ignored,
}

/// Decode a single JSON-RPC object.
///
/// A present-but-null `id` is treated like an absent one, so it is a notification.
pub fn decode(incoming: Value) -> Decoded {
    let Value::Object(mut obj) = incoming else {
        return Decoded::Rejected(error_response(
            Value::Null,
            RpcError::invalid_request("Request must be a JSON object"),
        ));
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
        Some(_) => {
            return Decoded::Rejected(error_response(
                Value::Null,
                RpcError::invalid_request("id must be a string, number or null"),
            ));
        }
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Decoded::Rejected(error_response(
            id.unwrap_or(Value::Null),
            RpcError::invalid_request("jsonrpc must be '2.0'"),
        ));
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => {
            return Decoded::Rejected(error_response(
                id.unwrap_or(Value::Null),
                RpcError::invalid_request("method must be a string"),
            ));
        }
        // Most likely a client response; the server issues no outbound requests.
        None => return Decoded::Ignored,
    };

    let params = obj.remove("params").unwrap_or(Value::Null);
    Decoded::Message(Incoming { id, method, params })
}

/// Method named by a payload, used by transports to make routing decisions
/// before dispatch. For a batch, `initialize` wins if any element carries it.
pub fn payload_method(payload: &Value) -> Option<&str> {
    match payload {
        Value::Object(obj) => obj.get("method").and_then(Value::as_str),
        Value::Array(items) => {
            let methods: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("method").and_then(Value::as_str))
                .collect();
            methods
                .iter()
                .find(|method| **method == "initialize")
                .or_else(|| methods.first())
                .copied()
        }
        _ => None,
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}
