// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ToolError;
use crate::tool::Tool;

/// A tool schema carried to the Runner (spec §4.B): kept independent of
/// `nextai-model` so this crate stays a leaf dependency.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Name→handler map with a disable list (spec §4.C).
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    disabled_names: HashSet<String>,
}

// SAFETY: ToolRegistry is Sync because HashMap<String, Arc<dyn Tool>> and
// HashSet<String> are themselves Sync when their elements are, tools are
// required to be Send + Sync, and no field offers interior mutability after
// construction.
unsafe impl Sync for ToolRegistry {}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            disabled_names: HashSet::new(),
        }
    }

    /// Builds a registry with the disabled set read from
    /// `NEXTAI_DISABLED_TOOLS` (comma-separated, spec §6).
    pub fn from_env() -> Self {
        let mut reg = Self::new();
        if let Ok(raw) = std::env::var("NEXTAI_DISABLED_TOOLS") {
            reg.disabled_names = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        reg
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn disable(&mut self, name: impl Into<String>) {
        self.disabled_names.insert(name.into());
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_names.contains(name)
    }

    /// `Invoke(name, input) → (string, error)` (spec §4.C).
    pub async fn invoke(&self, name: &str, input: &serde_json::Value) -> Result<String, ToolError> {
        if self.disabled_names.contains(name) {
            return Err(ToolError::Disabled(name.to_string()));
        }
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotSupported(name.to_string()))?;
        let result = tool.invoke(input).await?;
        Ok(extract_text_or_json(result))
    }

    /// Schemas for all registered, non-disabled tools.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| !self.disabled_names.contains(t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Names of all registered, non-disabled tools.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .keys()
            .filter(|n| !self.disabled_names.contains(n.as_str()))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_text_or_json(value: serde_json::Value) -> String {
    match value.get("text").and_then(|t| t.as_str()) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => value.to_string(),
    }
}
