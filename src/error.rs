//! Structured error taxonomy for the compiler.

use thiserror::Error;

use crate::types::{BuildStage, ShaderStage, TargetLanguage, ValueType};

/// Errors raised while walking and generating the node graph.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A node reached itself again while generating: the graph is cyclic.
    /// Fatal; detected by the flow chain guard before any text is emitted.
    #[error("cycle detected in node graph: `{node_type}` (node {node_id}) is already generating")]
    Graph { node_type: String, node_id: u64 },

    /// A node's output type could not be determined from its inputs or from
    /// the type expected by its consumer. Fatal.
    #[error("cannot resolve output type of `{node_type}` (node {node_id}){}", detail_suffix(.detail))]
    TypeResolution {
        node_type: String,
        node_id: u64,
        detail: String,
    },

    /// The target language cannot express a requested type or operation.
    /// Recoverable: the caller may retry with a different backend.
    #[error("{} backend cannot express {feature}", .language.as_str())]
    UnsupportedFeature {
        language: TargetLanguage,
        feature: String,
    },

    /// A uniform group's packed size exceeds the device limit. The caller
    /// can split the group and rebuild.
    #[error("bind group `{group}` needs {size} bytes, exceeding the {limit}-byte uniform buffer limit")]
    BindingOverflow { group: String, size: u64, limit: u64 },

    /// Two connected nodes produce types with no common promotion.
    #[error("type mismatch: cannot combine `{:?}` with `{:?}`{}", .left, .right, detail_suffix(.detail))]
    TypeMismatch {
        left: ValueType,
        right: ValueType,
        detail: String,
    },

    /// The graph description references something that does not exist.
    #[error("invalid graph description: {0}")]
    Description(String),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// A `CompileError` tagged with the stage it surfaced in.
///
/// Only the orchestration layer produces this wrapper; internal helpers
/// propagate bare `CompileError`s.
#[derive(Debug, Error)]
#[error("{} stage ({} pass): {source}", .shader_stage.as_str(), .build_stage.as_str())]
pub struct BuildError {
    pub shader_stage: ShaderStage,
    pub build_stage: BuildStage,
    #[source]
    pub source: CompileError,
}

impl BuildError {
    pub fn new(shader_stage: ShaderStage, build_stage: BuildStage, source: CompileError) -> Self {
        Self {
            shader_stage,
            build_stage,
            source,
        }
    }

    /// Whether a caller can meaningfully retry (different backend, split
    /// groups) rather than treat the graph as malformed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.source,
            CompileError::UnsupportedFeature { .. } | CompileError::BindingOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_is_stage_tagged() {
        let err = BuildError::new(
            ShaderStage::Fragment,
            BuildStage::Generate,
            CompileError::Graph {
                node_type: "Add".into(),
                node_id: 7,
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("fragment stage"), "{msg}");
        assert!(msg.contains("generate pass"), "{msg}");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn unsupported_feature_is_recoverable() {
        let err = BuildError::new(
            ShaderStage::Fragment,
            BuildStage::Generate,
            CompileError::UnsupportedFeature {
                language: TargetLanguage::Glsl,
                feature: "storage textures".into(),
            },
        );
        assert!(err.is_recoverable());
    }
}
