use thiserror::Error;

use crate::{msl::FlatCategory, ShaderStage};

/// A fatal error that stops compilation of a shader file.
///
/// The [Display](std::fmt::Display) output is the human readable message
/// reported to users and tools.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CompileError {
    #[error("Invalid character in file")]
    InvalidCharacter { line: usize },

    #[error("Expected valid file path after #include directive")]
    MissingIncludePath { line: usize },

    #[error("Multiple #{stage} declarations found!")]
    DuplicateStage { stage: ShaderStage },

    #[error("#end declaration without any form of begin")]
    UnmatchedEnd { line: usize },

    #[error("Expected material name after #material declaration")]
    MissingMaterialName { line: usize },

    #[error("Declaring the same material twice")]
    DuplicateMaterial { name: String },

    #[error("Shader file not recognised as a complete vertex-fragment or compute shader")]
    IncompleteShader,

    /// Combined GLSL to SPIR-V errors for every stage that failed.
    #[error("{0}")]
    Stage(String),

    /// Combined reflection and cross compilation errors.
    #[error("{0}")]
    Backend(String),
}

/// Diagnostic text reported verbatim by a shader compiler backend.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BackendError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ReflectError {
    #[error("error parsing SPIR-V: {0}")]
    Parse(#[from] BackendError),

    #[error("resources {first:?} and {second:?} share {category:?} set {set} binding {binding}")]
    DuplicateBinding {
        category: FlatCategory,
        set: u32,
        binding: u32,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error)]
pub enum WriteArtifactError {
    #[error("error writing shader artifact")]
    Io(#[from] std::io::Error),

    #[error("error serializing shader artifact")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ReadArtifactError {
    #[error("error reading shader artifact")]
    Io(#[from] std::io::Error),

    #[error("error deserializing shader artifact")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LoadBindingsError {
    #[error("artifact is not a complete vertex-fragment or compute shader")]
    MissingStages,

    #[error("{existing:?} and {new:?} are both bound to set {set} binding {binding}")]
    BindingConflict {
        set: u32,
        binding: u32,
        existing: String,
        new: String,
    },
}
