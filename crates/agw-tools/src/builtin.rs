// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools registered at startup.
//!
//! `core.echo` and `math.sum` are read tools; `demo.write_note` is a write
//! tool kept around so the approval path is exercisable out of the box.
//! None of them execute unless allowlisted by policy.

use std::sync::Arc;

use async_trait::async_trait;

use agw_core::{AgwError, ToolPermission};

use crate::{Tool, ToolRegistry, ToolSpec};

/// Echoes its arguments (debug).
pub struct EchoTool {
    spec: ToolSpec,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "core.echo".into(),
                description: "Echo args (debug).".into(),
                permission: ToolPermission::Read,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            },
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, AgwError> {
        Ok(serde_json::json!({ "echo": args }))
    }
}

/// Adds a list of numbers.
pub struct SumTool {
    spec: ToolSpec,
}

impl SumTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "math.sum".into(),
                description: "Sum a list of numbers.".into(),
                permission: ToolPermission::Read,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "values": { "type": "array", "items": { "type": "number" } }
                    },
                    "required": ["values"]
                }),
            },
        }
    }
}

impl Default for SumTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SumTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, AgwError> {
        let values = args
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AgwError::InvalidRequest("values must be an array".into()))?;
        let mut result = 0.0;
        for v in values {
            result += v
                .as_f64()
                .ok_or_else(|| AgwError::InvalidRequest("values must be numbers".into()))?;
        }
        Ok(serde_json::json!({ "result": result }))
    }
}

/// Appends a note to an in-memory pad. A write tool, so it trips the
/// approval gate under the default policy.
pub struct WriteNoteTool {
    spec: ToolSpec,
    notes: std::sync::Mutex<Vec<String>>,
}

impl WriteNoteTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "demo.write_note".into(),
                description: "Append a note to the server-side pad.".into(),
                permission: ToolPermission::Write,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "note": { "type": "string" } },
                    "required": ["note"]
                }),
            },
            notes: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for WriteNoteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteNoteTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, AgwError> {
        let note = args
            .get("note")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgwError::InvalidRequest("note must be a string".into()))?;
        let mut notes = self.notes.lock().expect("notes lock poisoned");
        notes.push(note.to_string());
        Ok(serde_json::json!({ "stored": true, "count": notes.len() }))
    }
}

/// Registers the built-in tool set.
pub fn register_builtins(registry: &mut ToolRegistry) -> Result<(), AgwError> {
    registry.register(Arc::new(EchoTool::new()))?;
    registry.register(Arc::new(SumTool::new()))?;
    registry.register(Arc::new(WriteNoteTool::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_args() {
        let tool = EchoTool::new();
        let out = tool.invoke(serde_json::json!({"text": "hi"})).await.unwrap();
        assert_eq!(out["echo"]["text"], "hi");
    }

    #[tokio::test]
    async fn sum_adds_values() {
        let tool = SumTool::new();
        let out = tool
            .invoke(serde_json::json!({"values": [1, 2]}))
            .await
            .unwrap();
        assert_eq!(out["result"], 3.0);
    }

    #[tokio::test]
    async fn sum_rejects_non_numbers() {
        let tool = SumTool::new();
        let result = tool.invoke(serde_json::json!({"values": ["x"]})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_note_appends() {
        let tool = WriteNoteTool::new();
        tool.invoke(serde_json::json!({"note": "first"})).await.unwrap();
        let out = tool.invoke(serde_json::json!({"note": "second"})).await.unwrap();
        assert_eq!(out["count"], 2);
    }

    #[test]
    fn builtins_register_with_expected_permissions() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.permission_of("math.sum"),
            Some(ToolPermission::Read)
        );
        assert_eq!(
            registry.permission_of("demo.write_note"),
            Some(ToolPermission::Write)
        );
    }
}
