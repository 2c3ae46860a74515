use serde_json::{Value, json};

/// Header carrying the request/response session token.
pub const SESSION_ID_HEADER: &str = "session-id";

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty_json(&err));
    std::process::exit(4);
}

/// Bearer key from `--api-key` / `SWITCHBOARD_API_KEY`, or exit with a usage error.
pub fn require_key(api_key: Option<&str>) -> &str {
    match api_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => key,
        None => exit_error(
            "An API key is required for this command.",
            Some("Pass --api-key or set SWITCHBOARD_API_KEY. Mint one with `switchboard keygen`."),
        ),
    }
}

/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub fn exit_code_for_status(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

pub fn connection_error(err: &reqwest::Error) -> i32 {
    let payload = json!({
        "error": "connection_error",
        "message": format!("{err}"),
        "docs_hint": "Is the server running? Check SWITCHBOARD_API_URL."
    });
    eprintln!("{}", to_pretty_json(&payload));
    3
}

/// Print `output` to stdout on success and stderr otherwise.
pub fn emit(output: &Value, exit_code: i32, raw: bool) -> i32 {
    let formatted = if raw {
        output.to_string()
    } else {
        to_pretty_json(output)
    };
    if exit_code == 0 {
        println!("{formatted}");
    } else {
        eprintln!("{formatted}");
    }
    exit_code
}

/// Execute an unauthenticated GET and print the JSON body.
pub async fn get_json(api_url: &str, path: &str, raw: bool) -> i32 {
    let resp = match client().get(format!("{api_url}{path}")).send().await {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };
    let exit_code = exit_code_for_status(resp.status().as_u16());
    let body: Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };
    emit(&body, exit_code, raw)
}

/// Parse JSON given inline or read from a file (`-` for stdin).
pub fn read_json_arg(inline: Option<&str>, file: Option<&str>) -> Result<Option<Value>, String> {
    if let Some(raw) = inline {
        return serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| format!("Invalid JSON: {e}"));
    }
    let Some(path) = file else {
        return Ok(None);
    };
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin()).map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_exit_code() {
        assert_eq!(exit_code_for_status(202), 0);
        assert_eq!(exit_code_for_status(404), 1);
        assert_eq!(exit_code_for_status(503), 2);
    }

    #[test]
    fn inline_json_wins_and_reports_errors() {
        assert_eq!(
            read_json_arg(Some(r#"{"a":1}"#), None).unwrap(),
            Some(json!({"a": 1}))
        );
        assert!(read_json_arg(Some("{a"), None).is_err());
        assert_eq!(read_json_arg(None, None).unwrap(), None);
        assert!(read_json_arg(None, Some("/definitely/not/here.json")).is_err());
    }
}
