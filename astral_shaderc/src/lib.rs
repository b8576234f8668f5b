//! astral_shaderc compiles combined shader files into a single JSON artifact
//! with SPIR-V, reflection data, and optionally Metal Shading Language for each stage.
//!
//! A shader file contains either a vertex and fragment stage or a single compute stage.
//! ```text
//! #material Surface
//! #vertex
//! #version 450
//! ...
//! #fragment
//! #version 450
//! ...
//! ```
//! Compilation runs in several steps.
//! 1. [splitter] splits the file into GLSL for each stage.
//! 2. [stage] compiles each stage to SPIR-V.
//! 3. [reflect] lists the uniforms, textures, samplers, and storage buffers for each stage.
//! 4. [msl] cross compiles each stage to MSL with flat Metal bindings.
//! 5. [artifact] writes everything to a `.shaderobj` JSON file.
//!
//! # Getting Started
//! ```rust no_run
//! use astral_shaderc::ShaderCompiler;
//!
//! let source = std::fs::read_to_string("lit.shader").unwrap();
//! let shader = ShaderCompiler::new().compile(&source).unwrap();
//! shader.save("lit.shaderobj").unwrap();
//! ```
use std::{fmt, path::Path};

use indexmap::IndexMap;
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub mod artifact;
pub mod error;
pub mod ir;
pub mod loader;
pub mod msl;
pub mod reflect;
pub mod splitter;
pub mod stage;
pub mod tokenizer;

use artifact::ShaderArtifact;
use error::{CompileError, WriteArtifactError};
use ir::{IrBackend, SpirvCrossIr};
use msl::cross_compile;
use reflect::reflect_stage;
use splitter::{split_stages, SplitShader, StageSources};
use stage::{ShadercCompiler, StageCompiler};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// The SPIR-V entry point name for this stage.
    pub fn entry_point(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "main",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Fragment => "Fragment",
            ShaderStage::Compute => "Compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

/// A uniform buffer block.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Uniform {
    /// The block name like `Matrices` in `uniform Matrices { ... } matrices;`.
    pub name: String,
    /// The size of the block in bytes.
    #[serde(rename = "stride")]
    pub size: usize,
    pub set: u32,
    pub binding: u32,
}

/// A separate image or sampler that may be an array.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayResource {
    pub name: String,
    /// The outermost array length or 0 if not an array.
    pub array_length: u32,
    pub set: u32,
    pub binding: u32,
    pub msl_binding: u32,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAttachment {
    pub name: String,
    /// The `input_attachment_index` layout qualifier.
    pub index: u32,
    pub set: u32,
    pub binding: u32,
    pub msl_binding: u32,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBuffer {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub msl_binding: u32,
}

/// The resources used by a single stage.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderVariables {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uniforms: Vec<Uniform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ArrayResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samplers: Vec<ArrayResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_attachments: Vec<InputAttachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_buffers: Vec<StorageBuffer>,
}

/// A material declared with `#material`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Material {
    /// The members of the matching storage buffer element struct
    /// or `None` if no stage uses the material.
    pub parameters: Option<Vec<MaterialParameter>>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MaterialParameter {
    pub name: String,
    /// The size in bytes.
    pub size: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CompiledStage {
    pub spirv: Vec<u32>,
    pub variables: ShaderVariables,
    /// The unescaped MSL source if cross compilation was enabled.
    ///
    /// Quotes and newlines are only escaped by serde_json when the artifact is written.
    pub msl: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CompiledProgram {
    VertexFragment {
        vertex: CompiledStage,
        fragment: CompiledStage,
    },
    Compute {
        compute: CompiledStage,
    },
}

/// The compiled stages and materials for a shader file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CompiledShader {
    /// Materials in declaration order.
    pub materials: IndexMap<String, Material>,
    pub program: CompiledProgram,
}

impl CompiledShader {
    pub fn is_compute(&self) -> bool {
        matches!(self.program, CompiledProgram::Compute { .. })
    }

    /// The vertex or compute stage.
    pub fn primary(&self) -> &CompiledStage {
        match &self.program {
            CompiledProgram::VertexFragment { vertex, .. } => vertex,
            CompiledProgram::Compute { compute } => compute,
        }
    }

    /// The fragment stage if present.
    pub fn secondary(&self) -> Option<&CompiledStage> {
        match &self.program {
            CompiledProgram::VertexFragment { fragment, .. } => Some(fragment),
            CompiledProgram::Compute { .. } => None,
        }
    }

    /// Write the compiled shader to `path` as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteArtifactError> {
        ShaderArtifact::from(self).save(path)
    }
}

/// Compiles shader files using a [StageCompiler] and [IrBackend].
///
/// The compiler holds no per file state and can be shared between threads
/// if the backends can.
#[derive(Debug, Clone)]
pub struct ShaderCompiler<C = ShadercCompiler, B = SpirvCrossIr> {
    stage_compiler: C,
    backend: B,
    optimize: bool,
    emit_msl: bool,
}

impl ShaderCompiler {
    /// Compile stages with shaderc and reflect and cross compile with SPIRV-Cross.
    pub fn new() -> Self {
        Self::with_backends(ShadercCompiler, SpirvCrossIr)
    }
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: StageCompiler, B: IrBackend> ShaderCompiler<C, B> {
    pub fn with_backends(stage_compiler: C, backend: B) -> Self {
        Self {
            stage_compiler,
            backend,
            optimize: false,
            emit_msl: true,
        }
    }

    /// Compile stages for performance instead of safety. Defaults to `false`.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Generate MSL for each stage. Defaults to `true`.
    pub fn emit_msl(mut self, emit_msl: bool) -> Self {
        self.emit_msl = emit_msl;
        self
    }

    /// Compile the contents of a shader file.
    #[tracing::instrument(skip_all)]
    pub fn compile(&self, source: &str) -> Result<CompiledShader, CompileError> {
        let SplitShader {
            stages,
            mut materials,
        } = split_stages(source)?;

        // Stage errors are reported for every failed stage at once.
        let program = match stages {
            StageSources::VertexFragment { vertex, fragment } => {
                let vertex_spirv = self.compile_stage(&vertex, ShaderStage::Vertex);
                let fragment_spirv = self.compile_stage(&fragment, ShaderStage::Fragment);
                match (vertex_spirv, fragment_spirv) {
                    (Ok(vertex), Ok(fragment)) => {
                        let mut messages = Vec::new();
                        let vertex_variables = self.reflect(
                            &vertex,
                            ShaderStage::Vertex,
                            &mut materials,
                            &mut messages,
                        );
                        let fragment_variables = self.reflect(
                            &fragment,
                            ShaderStage::Fragment,
                            &mut materials,
                            &mut messages,
                        );
                        let vertex_msl =
                            self.cross_compile(&vertex, ShaderStage::Vertex, &mut messages);
                        let fragment_msl =
                            self.cross_compile(&fragment, ShaderStage::Fragment, &mut messages);
                        backend_result(messages)?;

                        CompiledProgram::VertexFragment {
                            vertex: CompiledStage {
                                spirv: vertex,
                                variables: vertex_variables,
                                msl: vertex_msl,
                            },
                            fragment: CompiledStage {
                                spirv: fragment,
                                variables: fragment_variables,
                                msl: fragment_msl,
                            },
                        }
                    }
                    (vertex, fragment) => {
                        let mut message = String::new();
                        if let Err(e) = &vertex {
                            message.push_str(e);
                            message.push('\n');
                        }
                        if let Err(e) = &fragment {
                            if vertex.is_err() {
                                message.push('\n');
                            }
                            message.push_str(e);
                        }
                        return Err(CompileError::Stage(message));
                    }
                }
            }
            StageSources::Compute { compute } => {
                let compute = self
                    .compile_stage(&compute, ShaderStage::Compute)
                    .map_err(CompileError::Stage)?;

                let mut messages = Vec::new();
                let variables =
                    self.reflect(&compute, ShaderStage::Compute, &mut materials, &mut messages);
                let msl = self.cross_compile(&compute, ShaderStage::Compute, &mut messages);
                backend_result(messages)?;

                CompiledProgram::Compute {
                    compute: CompiledStage {
                        spirv: compute,
                        variables,
                        msl,
                    },
                }
            }
        };

        Ok(CompiledShader { materials, program })
    }

    fn compile_stage(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>, String> {
        debug!("Compiling {stage} stage");
        self.stage_compiler
            .compile(source, stage, stage.entry_point(), self.optimize)
            .map_err(|e| format!("{} Shader Error: {e}", stage.title()))
    }

    fn reflect(
        &self,
        spirv: &[u32],
        stage: ShaderStage,
        materials: &mut IndexMap<String, Material>,
        messages: &mut Vec<String>,
    ) -> ShaderVariables {
        match reflect_stage(&self.backend, spirv, materials) {
            Ok(variables) => variables,
            Err(e) => {
                error!("Error reflecting {stage} shader: {e}");
                messages.push(format!("Failed to perform reflection on {stage} shader"));
                ShaderVariables::default()
            }
        }
    }

    fn cross_compile(
        &self,
        spirv: &[u32],
        stage: ShaderStage,
        messages: &mut Vec<String>,
    ) -> Option<String> {
        if !self.emit_msl {
            return None;
        }
        match cross_compile(&self.backend, spirv) {
            Ok(msl) => Some(msl),
            Err(e) => {
                messages.push(format!("Failed to compile MSL for {stage} shader: {e}"));
                None
            }
        }
    }
}

fn backend_result(messages: Vec<String>) -> Result<(), CompileError> {
    if messages.is_empty() {
        Ok(())
    } else {
        Err(CompileError::Backend(messages.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use crate::{
        error::BackendError,
        ir::{IrResource, IrResources, IrStruct, IrStructMember, MslBinding},
    };

    const VERTEX_FRAGMENT: &str = indoc! {"
        #material Surface
        #vertex
        void main() { }
        #fragment
        void main() { }
    "};

    const COMPUTE: &str = indoc! {"
        #compute
        void main() { }
    "};

    /// Encodes the stage in the first word and fails for sources containing `error`.
    #[derive(Default)]
    struct FakeStageCompiler;

    impl StageCompiler for FakeStageCompiler {
        fn compile(
            &self,
            source: &str,
            stage: ShaderStage,
            entry_point: &str,
            optimize: bool,
        ) -> Result<Vec<u32>, BackendError> {
            assert_eq!(stage.entry_point(), entry_point);
            if source.contains("error") {
                Err(BackendError(format!("{stage} error")))
            } else {
                Ok(vec![stage as u32, optimize as u32])
            }
        }
    }

    /// Returns resources and MSL based on the stage in the first SPIR-V word.
    #[derive(Default)]
    struct FakeIr {
        fail_parse: bool,
        fail_msl: bool,
    }

    impl IrBackend for FakeIr {
        type Module = u32;

        fn parse(&self, spirv: &[u32]) -> Result<u32, BackendError> {
            if self.fail_parse {
                Err(BackendError::from("invalid magic number"))
            } else {
                Ok(spirv[0])
            }
        }

        fn resources(&self, module: &mut u32) -> Result<IrResources, BackendError> {
            let uniform = IrResource {
                name: "Matrices".to_string(),
                set: 0,
                binding: 0,
                block_size: Some(128),
                ..Default::default()
            };
            let input_attachment = IrResource {
                name: "gbuffer".to_string(),
                set: 0,
                binding: 2,
                input_attachment_index: 0,
                ..Default::default()
            };
            let storage_buffer = IrResource {
                name: "Surfaces".to_string(),
                set: 1,
                binding: 0,
                element_struct: Some(IrStruct {
                    name: Some("Surface".to_string()),
                    members: vec![IrStructMember {
                        name: "tint".to_string(),
                        size: Some(16),
                    }],
                }),
                ..Default::default()
            };

            if *module == ShaderStage::Vertex as u32 {
                Ok(IrResources {
                    uniform_buffers: vec![uniform],
                    ..Default::default()
                })
            } else {
                Ok(IrResources {
                    subpass_inputs: vec![input_attachment],
                    storage_buffers: vec![storage_buffer],
                    ..Default::default()
                })
            }
        }

        fn compile_msl(
            &self,
            module: &mut u32,
            bindings: &[MslBinding],
        ) -> Result<String, BackendError> {
            if self.fail_msl {
                Err(BackendError::from("unsupported"))
            } else {
                Ok(format!("// stage {module}\n// {} \"bindings\"", bindings.len()))
            }
        }
    }

    fn fake_compiler(fake_ir: FakeIr) -> ShaderCompiler<FakeStageCompiler, FakeIr> {
        ShaderCompiler::with_backends(FakeStageCompiler, fake_ir)
    }

    #[test]
    fn compile_vertex_fragment() {
        let shader = fake_compiler(FakeIr::default())
            .compile(VERTEX_FRAGMENT)
            .unwrap();

        assert!(!shader.is_compute());
        assert_eq!(
            CompiledStage {
                spirv: vec![0, 0],
                variables: ShaderVariables {
                    uniforms: vec![Uniform {
                        name: "Matrices".to_string(),
                        size: 128,
                        set: 0,
                        binding: 0
                    }],
                    ..Default::default()
                },
                msl: Some("// stage 0\n// 1 \"bindings\"".to_string())
            },
            *shader.primary()
        );
        assert_eq!(
            CompiledStage {
                spirv: vec![1, 0],
                variables: ShaderVariables {
                    input_attachments: vec![InputAttachment {
                        name: "gbuffer".to_string(),
                        index: 0,
                        set: 0,
                        binding: 2,
                        msl_binding: 0
                    }],
                    storage_buffers: vec![StorageBuffer {
                        name: "Surfaces".to_string(),
                        set: 1,
                        binding: 0,
                        msl_binding: 0
                    }],
                    ..Default::default()
                },
                msl: Some("// stage 1\n// 2 \"bindings\"".to_string())
            },
            *shader.secondary().unwrap()
        );
        assert_eq!(
            IndexMap::from([(
                "Surface".to_string(),
                Material {
                    parameters: Some(vec![MaterialParameter {
                        name: "tint".to_string(),
                        size: 16
                    }])
                }
            )]),
            shader.materials
        );
    }

    #[test]
    fn compile_compute_optimized_without_msl() {
        let shader = fake_compiler(FakeIr::default())
            .optimize(true)
            .emit_msl(false)
            .compile(COMPUTE)
            .unwrap();

        assert!(shader.is_compute());
        assert_eq!(None, shader.secondary());
        assert_eq!(vec![2, 1], shader.primary().spirv);
        assert_eq!(None, shader.primary().msl);
        assert!(shader.materials.is_empty());
    }

    #[test]
    fn compile_split_error() {
        assert_eq!(
            CompileError::IncompleteShader,
            fake_compiler(FakeIr::default())
                .compile("#vertex\nvoid main() { }")
                .unwrap_err()
        );
    }

    #[test]
    fn compile_both_stages_fail() {
        let source = indoc! {"
            #vertex
            error
            #fragment
            error
        "};
        assert_eq!(
            "Vertex Shader Error: vertex error\n\nFragment Shader Error: fragment error",
            fake_compiler(FakeIr::default())
                .compile(source)
                .unwrap_err()
                .to_string()
        );
    }

    #[test]
    fn compile_fragment_stage_fails() {
        let source = indoc! {"
            #vertex
            void main() { }
            #fragment
            error
        "};
        assert_eq!(
            CompileError::Stage("Fragment Shader Error: fragment error".to_string()),
            fake_compiler(FakeIr::default())
                .compile(source)
                .unwrap_err()
        );
    }

    #[test]
    fn compile_vertex_stage_fails() {
        let source = indoc! {"
            #vertex
            error
            #fragment
            void main() { }
        "};
        assert_eq!(
            CompileError::Stage("Vertex Shader Error: vertex error\n".to_string()),
            fake_compiler(FakeIr::default())
                .compile(source)
                .unwrap_err()
        );
    }

    #[test]
    fn compile_compute_stage_fails() {
        let source = indoc! {"
            #compute
            error
        "};
        assert_eq!(
            "Compute Shader Error: compute error",
            fake_compiler(FakeIr::default())
                .compile(source)
                .unwrap_err()
                .to_string()
        );
    }

    #[test]
    fn compile_reflection_fails() {
        let fake_ir = FakeIr {
            fail_parse: true,
            fail_msl: false,
        };
        assert_eq!(
            CompileError::Backend(
                indoc! {"
                    Failed to perform reflection on vertex shader
                    Failed to perform reflection on fragment shader
                    Failed to compile MSL for vertex shader: invalid magic number
                    Failed to compile MSL for fragment shader: invalid magic number"}
                .to_string()
            ),
            fake_compiler(fake_ir).compile(VERTEX_FRAGMENT).unwrap_err()
        );
    }

    #[test]
    fn compile_msl_fails() {
        let fake_ir = FakeIr {
            fail_parse: false,
            fail_msl: true,
        };
        assert_eq!(
            CompileError::Backend("Failed to compile MSL for compute shader: unsupported".to_string()),
            fake_compiler(fake_ir).compile(COMPUTE).unwrap_err()
        );
    }

    #[test]
    fn compile_msl_disabled_ignores_msl_errors() {
        let fake_ir = FakeIr {
            fail_parse: false,
            fail_msl: true,
        };
        let shader = fake_compiler(fake_ir)
            .emit_msl(false)
            .compile(VERTEX_FRAGMENT)
            .unwrap();
        assert_eq!(None, shader.primary().msl);
        assert_eq!(None, shader.secondary().unwrap().msl);
    }

    #[test]
    fn shader_stage_names() {
        assert_eq!("vertex", ShaderStage::Vertex.to_string());
        assert_eq!("fragment", ShaderStage::Fragment.entry_point());
        assert_eq!("main", ShaderStage::Compute.entry_point());
    }
}
