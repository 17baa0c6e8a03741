// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! The [`Tool`] trait is the unified interface for everything an agent run
//! may invoke. The [`ToolRegistry`] manages lookup by namespaced name and
//! generates planner-format tool definitions. The registry is immutable
//! after startup; hot reload is a whole-registry swap performed by the
//! gateway core under its write lock.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use agw_core::{AgwError, ToolPermission};

/// Specification of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Namespaced name, e.g. `math.sum`.
    pub name: String,
    /// Human-readable description for the planner.
    pub description: String,
    /// Permission class. `write` implies approval-required by default.
    pub permission: ToolPermission,
    /// JSON Schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

/// Unified trait for all invocable tools.
///
/// The orchestrator calls `invoke` with the parsed JSON arguments from the
/// planner's tool call, after the policy gate has passed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's specification (name, permission, schema).
    fn spec(&self) -> &ToolSpec;

    /// Invokes the tool. Errors are surfaced to the run as a failed tool
    /// result, never as a run crash.
    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, AgwError>;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. Names are unique; a duplicate registration fails.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgwError> {
        let name = tool.spec().name.clone();
        if self.tools.contains_key(&name) {
            return Err(AgwError::InvalidRequest(format!(
                "tool already registered: {name}"
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Permission class for a name, `None` when unregistered.
    pub fn permission_of(&self, name: &str) -> Option<ToolPermission> {
        self.tools.get(name).map(|t| t.spec().permission)
    }

    /// All specs, sorted by name.
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Planner-format tool definitions, sorted by name:
    /// `{name, description, input_schema}`.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        self.list()
            .into_iter()
            .map(|spec| {
                serde_json::json!({
                    "name": spec.name,
                    "description": spec.description,
                    "input_schema": spec.parameters,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
