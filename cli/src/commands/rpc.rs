use clap::{Args, Subcommand};
use serde_json::{Value, json};

use crate::util::{
    SESSION_ID_HEADER, client, connection_error, emit, exit_code_for_status, exit_error,
    read_json_arg,
};

const CLIENT_NAME: &str = "switchboard-cli";

/// Connection settings shared by every JSON-RPC command.
pub struct RpcTarget<'a> {
    pub api_url: &'a str,
    pub api_key: &'a str,
    pub session: Option<&'a str>,
    pub raw: bool,
}

#[derive(Subcommand)]
pub enum ToolsCommands {
    /// List the tools this key may call
    List,
    /// Call one tool
    Call {
        /// Tool name, e.g. task_create
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, short = 'a')]
        args: Option<String>,
        /// Read tool arguments from file (use '-' for stdin)
        #[arg(long, conflicts_with = "args")]
        args_file: Option<String>,
    },
}

#[derive(Args)]
pub struct RawArgs {
    /// JSON-RPC method, e.g. tools/list
    pub method: String,
    /// Params as a JSON value
    #[arg(long, short = 'p')]
    pub params: Option<String>,
    /// Send as a notification (no id, no reply expected)
    #[arg(long)]
    pub notify: bool,
}

pub async fn initialize(target: &RpcTarget<'_>) -> i32 {
    let params = json!({
        "protocolVersion": "2025-06-18",
        "clientInfo": {"name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION")}
    });
    send(target, request(1, "initialize", Some(params))).await
}

pub async fn ping(target: &RpcTarget<'_>) -> i32 {
    send(target, request(1, "ping", None)).await
}

pub async fn tools(target: &RpcTarget<'_>, command: ToolsCommands) -> i32 {
    match command {
        ToolsCommands::List => send(target, request(1, "tools/list", None)).await,
        ToolsCommands::Call {
            name,
            args,
            args_file,
        } => {
            let arguments = match read_json_arg(args.as_deref(), args_file.as_deref()) {
                Ok(Some(Value::Object(map))) => Value::Object(map),
                Ok(None) => json!({}),
                Ok(Some(_)) => exit_error(
                    "Tool arguments must be a JSON object.",
                    Some("Example: --args '{\"title\": \"Rotate keys\"}'"),
                ),
                Err(message) => exit_error(&message, None),
            };
            let params = json!({"name": name, "arguments": arguments});
            send(target, request(1, "tools/call", Some(params))).await
        }
    }
}

pub async fn raw(target: &RpcTarget<'_>, args: RawArgs) -> i32 {
    let params = match read_json_arg(args.params.as_deref(), None) {
        Ok(params) => params,
        Err(message) => exit_error(&message, None),
    };
    let payload = if args.notify {
        notification(&args.method, params)
    } else {
        request(1, &args.method, params)
    };
    send(target, payload).await
}

/// Close a request/response session on the server.
pub async fn end_session(api_url: &str, api_key: &str, session: &str, raw: bool) -> i32 {
    let resp = match client()
        .delete(format!("{api_url}/rpc"))
        .bearer_auth(api_key)
        .header(SESSION_ID_HEADER, session)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };
    let status = resp.status().as_u16();
    let body = if status == 204 {
        json!({"session_id": session, "closed": true})
    } else {
        resp.json()
            .await
            .unwrap_or_else(|_| json!({"status": status}))
    };
    emit(&body, exit_code_for_status(status), raw)
}

fn request(id: i64, method: &str, params: Option<Value>) -> Value {
    let mut payload = json!({"jsonrpc": "2.0", "id": id, "method": method});
    if let Some(params) = params {
        payload["params"] = params;
    }
    payload
}

fn notification(method: &str, params: Option<Value>) -> Value {
    let mut payload = json!({"jsonrpc": "2.0", "method": method});
    if let Some(params) = params {
        payload["params"] = params;
    }
    payload
}

/// POST one payload to /rpc and print `{session_id, response}`.
///
/// A JSON-RPC error or a tool result flagged `isError` exits with 1.
async fn send(target: &RpcTarget<'_>, payload: Value) -> i32 {
    tracing::debug!(method = ?payload.get("method"), session = ?target.session, "POST /rpc");

    let mut req = client()
        .post(format!("{}/rpc", target.api_url))
        .bearer_auth(target.api_key)
        .json(&payload);
    if let Some(session) = target.session {
        req = req.header(SESSION_ID_HEADER, session);
    }

    let resp = match req.send().await {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };

    let status = resp.status().as_u16();
    let session_id = resp
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let body = match resp.bytes().await {
        Ok(bytes) if bytes.is_empty() => Value::Null,
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(
            |e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
        ),
        Err(err) => return connection_error(&err),
    };

    let mut exit_code = exit_code_for_status(status);
    if exit_code == 0 && reports_failure(&body) {
        exit_code = 1;
    }
    let output = json!({"status": status, "session_id": session_id, "response": body});
    emit(&output, exit_code, target.raw)
}

fn reports_failure(body: &Value) -> bool {
    let single = |reply: &Value| {
        reply.get("error").is_some()
            || reply
                .pointer("/result/isError")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    };
    match body {
        Value::Array(replies) => replies.iter().any(single),
        reply => single(reply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_params_when_absent() {
        let payload = request(1, "tools/list", None);
        assert_eq!(payload, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
        let note = notification("notifications/initialized", None);
        assert!(note.get("id").is_none());
    }

    #[test]
    fn failures_are_detected_in_errors_and_tool_results() {
        assert!(reports_failure(&json!({"error": {"code": -32003}})));
        assert!(reports_failure(&json!({"result": {"isError": true}})));
        assert!(!reports_failure(&json!({"result": {"isError": false}})));
        assert!(reports_failure(&json!([{"result": {}}, {"error": {}}])));
        assert!(!reports_failure(&Value::Null));
    }
}
