//! The `.shaderobj` JSON file format.
//!
//! ```json
//! {
//!   "materials": { "Surface": { "tint": 16 } },
//!   "vertex": { "uniforms": [...], "spirv": [...], "msl": "..." },
//!   "fragment": { "images": [...], "samplers": [...], "spirv": [...] }
//! }
//! ```
//! Compute shaders have a single `compute` object instead of `vertex` and `fragment`.
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ReadArtifactError, WriteArtifactError},
    CompiledProgram, CompiledShader, CompiledStage, ShaderVariables,
};

#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct ShaderArtifact {
    /// The size in bytes of each parameter for each material.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub materials: IndexMap<String, IndexMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<StageArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<StageArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<StageArtifact>,
}

#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct StageArtifact {
    #[serde(flatten)]
    pub variables: ShaderVariables,
    pub spirv: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msl: Option<String>,
}

impl ShaderArtifact {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReadArtifactError> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Write pretty printed JSON to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteArtifactError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

impl From<&CompiledStage> for StageArtifact {
    fn from(stage: &CompiledStage) -> Self {
        Self {
            variables: stage.variables.clone(),
            spirv: stage.spirv.clone(),
            msl: stage.msl.clone(),
        }
    }
}

impl From<&CompiledShader> for ShaderArtifact {
    fn from(shader: &CompiledShader) -> Self {
        // Materials unused by any stage are still written without parameters.
        let materials = shader
            .materials
            .iter()
            .map(|(name, material)| {
                let parameters = material
                    .parameters
                    .iter()
                    .flatten()
                    .map(|p| (p.name.clone(), p.size))
                    .collect();
                (name.clone(), parameters)
            })
            .collect();

        match &shader.program {
            CompiledProgram::VertexFragment { vertex, fragment } => Self {
                materials,
                compute: None,
                vertex: Some(vertex.into()),
                fragment: Some(fragment.into()),
            },
            CompiledProgram::Compute { compute } => Self {
                materials,
                compute: Some(compute.into()),
                vertex: None,
                fragment: None,
            },
        }
    }
}
