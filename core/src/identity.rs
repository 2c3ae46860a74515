use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability tags a principal may hold. Tools that declare no required
/// capability are usable by any authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Hire,
    Deploy,
    Observe,
    Broadcast,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Hire,
        Capability::Deploy,
        Capability::Observe,
        Capability::Broadcast,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Hire => "hire",
            Capability::Deploy => "deploy",
            Capability::Observe => "observe",
            Capability::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability tag '{0}'")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Capability::ALL
            .into_iter()
            .find(|capability| capability.as_str() == normalized)
            .ok_or_else(|| UnknownCapability(raw.to_string()))
    }
}

/// An authenticated caller. Permission checks and result attribution key off this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub agent_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Whether the one-time onboarding step has been completed.
    #[serde(default)]
    pub onboarded: bool,
}

impl Principal {
    pub fn new(agent_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            agent_id,
            name: name.into(),
            capabilities: BTreeSet::new(),
            onboarded: false,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_onboarded(mut self, onboarded: bool) -> Self {
        self.onboarded = onboarded;
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Presence status advertised for an agent while it holds a push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Away,
    #[default]
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_tags_parse_case_insensitively() {
        assert_eq!("hire".parse::<Capability>(), Ok(Capability::Hire));
        assert_eq!(" Deploy ".parse::<Capability>(), Ok(Capability::Deploy));
        assert!("admin".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_serializes_as_lowercase_tag() {
        let value = serde_json::to_value(Capability::Broadcast).unwrap();
        assert_eq!(value, serde_json::json!("broadcast"));
    }

    #[test]
    fn principal_membership_check() {
        let principal = Principal::new(Uuid::now_v7(), "ops").with_capability(Capability::Observe);
        assert!(principal.has(Capability::Observe));
        assert!(!principal.has(Capability::Hire));
        assert!(!principal.onboarded);
    }

    #[test]
    fn principal_deserializes_with_defaults() {
        let principal: Principal = serde_json::from_value(serde_json::json!({
            "agent_id": "0190b2a4-7d3e-7c1a-9b5e-2f4d6a8c0e12",
            "name": "builder"
        }))
        .unwrap();
        assert!(principal.capabilities.is_empty());
        assert!(!principal.onboarded);
    }
}
