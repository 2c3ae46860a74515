use clap::Args;
use serde::Serialize;
use serde_json::json;
use switchboard_core::auth::{generate_api_key, key_prefix};
use switchboard_core::identity::Capability;
use uuid::Uuid;

use crate::util::{emit, exit_error};

#[derive(Args)]
pub struct KeygenArgs {
    /// Display name of the agent
    #[arg(long)]
    pub name: String,
    /// Agent id (a new UUIDv7 if omitted)
    #[arg(long)]
    pub agent_id: Option<Uuid>,
    /// Capability to grant (repeatable: hire, deploy, observe, broadcast)
    #[arg(long = "capability", short = 'c')]
    pub capabilities: Vec<String>,
    /// Mark the agent as already onboarded
    #[arg(long)]
    pub onboarded: bool,
}

/// One credential-file entry, in the shape the server loads.
#[derive(Debug, Serialize)]
pub struct CredentialEntry {
    pub key_hash: String,
    pub agent_id: Uuid,
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub onboarded: bool,
}

pub fn run(args: KeygenArgs, raw: bool) -> i32 {
    let capabilities = match parse_capabilities(&args.capabilities) {
        Ok(capabilities) => capabilities,
        Err(message) => exit_error(
            &message,
            Some("Known capabilities: hire, deploy, observe, broadcast"),
        ),
    };

    let (api_key, key_hash) = generate_api_key();
    let entry = CredentialEntry {
        key_hash,
        agent_id: args.agent_id.unwrap_or_else(Uuid::now_v7),
        name: args.name,
        capabilities,
        onboarded: args.onboarded,
    };

    let output = json!({
        "api_key": api_key,
        "key_prefix": key_prefix(&api_key),
        "entry": entry,
        "note": "Store api_key now; the server keeps only key_hash. Append entry to the credential file and restart."
    });
    emit(&output, 0, raw)
}

fn parse_capabilities(raw: &[String]) -> Result<Vec<Capability>, String> {
    let mut capabilities = Vec::new();
    for tag in raw.iter().flat_map(|value| value.split(',')) {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        let capability = tag.parse::<Capability>().map_err(|err| err.to_string())?;
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }
    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_accept_repeats_and_commas() {
        let parsed = parse_capabilities(&[
            "hire,Deploy".to_string(),
            "hire".to_string(),
            " ".to_string(),
        ])
        .unwrap();
        assert_eq!(parsed, vec![Capability::Hire, Capability::Deploy]);
        assert!(parse_capabilities(&["root".to_string()]).is_err());
    }

    #[test]
    fn entry_serializes_in_credential_file_shape() {
        let entry = CredentialEntry {
            key_hash: "ab".to_string(),
            agent_id: Uuid::nil(),
            name: "ops".to_string(),
            capabilities: vec![Capability::Observe],
            onboarded: true,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["capabilities"], json!(["observe"]));
        assert_eq!(value["onboarded"], true);
    }
}
