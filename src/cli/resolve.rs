//! Resolve command for choreo.
//!
//! Loads a program document, grounds one action against the document's
//! state and prints the primitive calls it expands to. The knowledge base
//! can come from the document itself or from the knowledge store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::describe_value;
use crate::config::EngineConfig;
use crate::error::{ChoreoError, Result};
use crate::program::{GroundedCall, Limits, ProgramDocument};
use crate::storage::KnowledgeStore;

/// Options for the resolve command.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Program document (JSON).
    pub program: PathBuf,
    /// Action name or id.
    pub action: String,
    /// Use this stored knowledge base instead of the document's own.
    pub knowledge_base: Option<String>,
    /// Store the document's knowledge base under this name before resolving.
    pub save_as: Option<String>,
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the resolve command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub calls: Vec<GroundedCall>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveOutput {
    pub fn success(action: impl Into<String>, calls: Vec<GroundedCall>) -> Self {
        let count = calls.len();
        Self {
            success: true,
            action: Some(action.into()),
            calls,
            count,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            calls: Vec::new(),
            count: 0,
            error: Some(error.into()),
        }
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Resolve failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        let action = self.action.as_deref().unwrap_or("?");
        if self.calls.is_empty() {
            return format!("{} resolves to no primitive calls.", action);
        }

        let mut lines = vec![format!("{} ({} calls):", action, self.count)];
        for (index, call) in self.calls.iter().enumerate() {
            let arguments: Vec<String> = call
                .parameters
                .iter()
                .map(|(name, value)| format!("{}={}", name, describe_value(value)))
                .collect();
            lines.push(format!(
                "  {}. {}({})",
                index + 1,
                call.name,
                arguments.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// The resolve command implementation.
pub struct ResolveCommand<S: KnowledgeStore> {
    store: S,
    engine: EngineConfig,
}

impl<S: KnowledgeStore> ResolveCommand<S> {
    pub fn new(store: S, engine: EngineConfig) -> Self {
        Self { store, engine }
    }

    pub fn run(&self, options: &ResolveOptions) -> ResolveOutput {
        match self.resolve(options) {
            Ok((action, calls)) => ResolveOutput::success(action, calls),
            Err(e) => ResolveOutput::failure(e.to_string()),
        }
    }

    /// Render `output` for the terminal according to `options`.
    pub fn format_output(&self, output: &ResolveOutput, options: &ResolveOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }

    fn resolve(&self, options: &ResolveOptions) -> Result<(String, Vec<GroundedCall>)> {
        let document = ProgramDocument::load(&options.program)?;

        if let Some(name) = &options.save_as {
            self.store.put(name, &document.knowledge_base)?;
            info!(name = %name, "stored knowledge base");
        }

        let kb = match &options.knowledge_base {
            Some(name) => self
                .store
                .get(name)?
                .ok_or_else(|| ChoreoError::not_found("knowledge base", name.as_str()))?,
            None => document.knowledge_base.clone(),
        };

        let mut ctx = document.context(&self.engine)?;
        kb.install_prototypes(&mut ctx);
        let executable = kb.lookup(&options.action)?;
        let calls = kb
            .interpreter()
            .with_limits(Limits::from(&self.engine))
            .resolve(executable.id(), &document.arguments, &mut ctx)?;
        Ok((executable.name().to_string(), calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKnowledgeStore;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const PROGRAM: &str = r#"{
        "knowledge_base": {
            "executables": [
                {"kind": "primitive", "id": "move_ee", "name": "move_ee",
                 "parameters": ["agent", "pose", "priority"]},
                {"kind": "primitive", "id": "grasp", "name": "grasp",
                 "parameters": ["agent", "object"]},
                {"kind": "action", "id": "Grasp", "name": "Grasp",
                 "parameters": ["agent", "object"],
                 "subactions": [
                    {"kind": "call", "id": "move_ee", "parameters": {
                        "agent": {"kind": "term", "name": "agent"},
                        "pose": {"kind": "operation", "operator": "access",
                                 "lhs": {"kind": "term", "name": "object"},
                                 "rhs": {"kind": "literal", "value": {"type": "text", "value": "pose"}}},
                        "priority": {"kind": "literal", "value": {"type": "number", "value": 1.0}}
                    }},
                    {"kind": "call", "id": "grasp", "parameters": {
                        "agent": {"kind": "term", "name": "agent"},
                        "object": {"kind": "term", "name": "object"}
                    }}
                 ]}
            ]
        },
        "state": [
            {"id": "panda", "name": "panda"},
            {"id": "ball", "name": "ball", "properties": [
                {"name": "pose", "value": {"type": "pose", "value": {
                    "position": {"x": 0.5, "y": 0.0, "z": 0.1},
                    "orientation": {"w": 1.0, "x": 0.0, "y": 0.0, "z": 0.0}}}}
            ]}
        ],
        "references": {"PandaRef": "panda", "BallRef": "ball"},
        "arguments": {
            "agent": {"kind": "term", "name": "PandaRef"},
            "object": {"kind": "term", "name": "BallRef"}
        }
    }"#;

    fn write_program(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("program.json");
        fs::write(&path, PROGRAM).unwrap();
        path
    }

    fn options(program: PathBuf) -> ResolveOptions {
        ResolveOptions {
            program,
            action: "Grasp".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_from_document() {
        let dir = TempDir::new().unwrap();
        let cmd = ResolveCommand::new(MemoryKnowledgeStore::new(), EngineConfig::default());
        let output = cmd.run(&options(write_program(&dir)));

        assert!(output.success, "{:?}", output.error);
        assert_eq!(output.count, 2);
        assert_eq!(output.calls[0].name, "move_ee");
        assert_eq!(output.calls[1].name, "grasp");
        let text = output.format_text();
        assert!(text.contains("Grasp (2 calls)"));
        assert!(text.contains("agent=panda<panda>"));
        assert!(text.contains("pose=pose(0.500, 0.000, 0.100)"));
    }

    #[test]
    fn test_save_then_resolve_from_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryKnowledgeStore::new());
        let cmd = ResolveCommand::new(Arc::clone(&store), EngineConfig::default());
        let program = write_program(&dir);

        let saved = cmd.run(&ResolveOptions {
            save_as: Some("demo".to_string()),
            ..options(program.clone())
        });
        assert!(saved.success);
        assert!(store.exists("demo").unwrap());

        let from_store = cmd.run(&ResolveOptions {
            knowledge_base: Some("demo".to_string()),
            ..options(program)
        });
        assert!(from_store.success);
        assert_eq!(from_store.count, 2);
    }

    #[test]
    fn test_missing_stored_kb() {
        let dir = TempDir::new().unwrap();
        let cmd = ResolveCommand::new(MemoryKnowledgeStore::new(), EngineConfig::default());
        let output = cmd.run(&ResolveOptions {
            knowledge_base: Some("absent".to_string()),
            ..options(write_program(&dir))
        });
        assert!(!output.success);
        assert!(output.format_text().contains("knowledge base not found: absent"));
    }

    #[test]
    fn test_unknown_action() {
        let dir = TempDir::new().unwrap();
        let cmd = ResolveCommand::new(MemoryKnowledgeStore::new(), EngineConfig::default());
        let output = cmd.run(&ResolveOptions {
            action: "Juggle".to_string(),
            ..options(write_program(&dir))
        });
        assert!(!output.success);
        assert!(output.error.unwrap().contains("Juggle"));
    }
}
