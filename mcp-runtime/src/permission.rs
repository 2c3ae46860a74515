//! Projection of the catalog onto what a given caller may see and call.
//!
//! Listing and calling share [`PermissionFilter::permits`], so a tool is
//! callable exactly when it is listed.

use std::sync::Arc;

use switchboard_core::identity::{Capability, Principal};

use crate::catalog::{ToolCatalog, ToolDefinition};
use crate::session::Session;

/// Caller identity plus the per-session onboarding state.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub principal: &'a Principal,
    pub onboarded: bool,
}

impl<'a> Caller<'a> {
    pub fn new(principal: &'a Principal) -> Self {
        Self {
            principal,
            onboarded: principal.onboarded,
        }
    }

    pub fn of(session: &'a Session) -> Self {
        Self {
            principal: session.principal(),
            onboarded: session.is_onboarded(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    UnknownTool,
    AlreadyOnboarded,
    MissingCapability(Capability),
}

#[derive(Debug, Clone)]
pub struct PermissionFilter {
    catalog: Arc<ToolCatalog>,
}

impl PermissionFilter {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn list_for(&self, caller: Caller<'_>) -> Vec<&ToolDefinition> {
        self.catalog
            .iter()
            .filter(|tool| Self::permits(caller, tool).is_ok())
            .collect()
    }

    pub fn is_callable(&self, caller: Caller<'_>, tool_name: &str) -> bool {
        self.check(caller, tool_name).is_ok()
    }

    /// Resolve a tool for invocation, or say why the caller may not use it.
    pub fn check(&self, caller: Caller<'_>, tool_name: &str) -> Result<&ToolDefinition, Denial> {
        let tool = self.catalog.get(tool_name).ok_or(Denial::UnknownTool)?;
        Self::permits(caller, tool)?;
        Ok(tool)
    }

    fn permits(caller: Caller<'_>, tool: &ToolDefinition) -> Result<(), Denial> {
        if tool.init_only && caller.onboarded {
            return Err(Denial::AlreadyOnboarded);
        }
        match tool.required_permission {
            Some(capability) if !caller.principal.has(capability) => {
                Err(Denial::MissingCapability(capability))
            }
            _ => Ok(()),
        }
    }
}
