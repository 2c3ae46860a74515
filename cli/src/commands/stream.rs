use clap::Args;
use eventsource_client as es;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::util::{
    client, connection_error, emit, exit_code_for_status, exit_error, read_json_arg,
    to_pretty_json,
};

#[derive(Args)]
pub struct StreamArgs {
    /// Also print keepalive comments
    #[arg(long)]
    pub show_keepalive: bool,
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Session id from the stream's endpoint frame
    #[arg(long)]
    pub session: String,
    /// JSON-RPC payload
    #[arg(long, short = 'd')]
    pub data: Option<String>,
    /// Read the payload from file (use '-' for stdin)
    #[arg(long, short = 'f', conflicts_with = "data")]
    pub data_file: Option<String>,
}

/// One JSON line for an SSE event; `data` is inlined when it parses as JSON.
fn event_line(event_type: &str, data: &str) -> Value {
    let data = serde_json::from_str(data).unwrap_or_else(|_| json!(data));
    json!({ "event": event_type, "data": data })
}

fn stream_error(err: &es::Error) -> i32 {
    let payload = json!({
        "error": "stream_error",
        "message": err.to_string(),
        "docs_hint": "Check the API key and that the server is reachable at SWITCHBOARD_API_URL."
    });
    eprintln!("{}", to_pretty_json(&payload));
    3
}

/// Hold a push stream open and print each event as one JSON line.
pub async fn run(api_url: &str, api_key: &str, args: StreamArgs) -> i32 {
    let client = match es::ClientBuilder::for_url(&format!("{api_url}/push-stream"))
        .and_then(|builder| builder.header("Authorization", &format!("Bearer {api_key}")))
    {
        Ok(builder) => builder
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build(),
        Err(err) => return stream_error(&err),
    };
    tail(&client, &args).await
}

/// A new connection would be a new session, so the stream is never retried.
async fn tail(client: &impl es::Client, args: &StreamArgs) -> i32 {
    let mut stream = client.stream();
    while let Some(item) = stream.next().await {
        match item {
            Ok(es::SSE::Connected(_)) => tracing::debug!("Push stream connected"),
            Ok(es::SSE::Event(event)) => {
                println!("{}", event_line(&event.event_type, &event.data));
            }
            Ok(es::SSE::Comment(comment)) => {
                if args.show_keepalive {
                    println!("{}", json!({"event": "keepalive", "comment": comment.trim()}));
                }
            }
            Err(es::Error::Eof) => break,
            Err(err) => return stream_error(&err),
        }
    }
    tracing::debug!("Push stream closed by server");
    0
}

/// POST a payload to a push-stream session; the reply arrives on the stream.
pub async fn submit(api_url: &str, api_key: &str, args: SubmitArgs, raw: bool) -> i32 {
    let payload = match read_json_arg(args.data.as_deref(), args.data_file.as_deref()) {
        Ok(Some(payload)) => payload,
        Ok(None) => exit_error("A JSON-RPC payload is required.", Some("Pass --data or --data-file")),
        Err(message) => exit_error(&message, None),
    };

    let resp = match client()
        .post(format!("{api_url}/push-stream/submit"))
        .query(&[("session", args.session.as_str())])
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };
    let status = resp.status().as_u16();
    let body = if status == 202 {
        json!({"accepted": true, "session_id": args.session})
    } else {
        resp.json()
            .await
            .unwrap_or_else(|_| json!({"status": status}))
    };
    emit(&body, exit_code_for_status(status), raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_event_keeps_its_url_as_text() {
        let line = event_line("endpoint", "http://x/push-stream/submit?session=abc");
        assert_eq!(line["event"], "endpoint");
        assert_eq!(line["data"], "http://x/push-stream/submit?session=abc");
    }

    #[test]
    fn message_data_is_inlined_as_json() {
        let line = event_line("message", r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        assert_eq!(line["event"], "message");
        assert_eq!(line["data"]["id"], 1);
    }

    #[test]
    fn builder_rejects_unusable_url() {
        assert!(es::ClientBuilder::for_url("not a url").is_err());
    }
}
