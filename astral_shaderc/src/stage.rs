//! Compile a single GLSL stage to SPIR-V.
use log::{debug, warn};
use shaderc::{
    CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, SpirvVersion, TargetEnv,
};

use crate::{error::BackendError, ShaderStage};

/// A GLSL to SPIR-V compiler for a single shader stage.
pub trait StageCompiler {
    /// Compile `source` for `stage` and name the entry point `entry_point`.
    ///
    /// The error contains the full diagnostic text from the compiler.
    fn compile(
        &self,
        source: &str,
        stage: ShaderStage,
        entry_point: &str,
        optimize: bool,
    ) -> Result<Vec<u32>, BackendError>;
}

/// A [StageCompiler] using shaderc targeting Vulkan 1.1 and SPIR-V 1.3.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadercCompiler;

impl StageCompiler for ShadercCompiler {
    fn compile(
        &self,
        source: &str,
        stage: ShaderStage,
        entry_point: &str,
        optimize: bool,
    ) -> Result<Vec<u32>, BackendError> {
        // The compiler is not thread safe, so each call gets its own.
        let compiler = Compiler::new().ok_or_else(|| BackendError::from("shaderc not available"))?;
        let mut options = CompileOptions::new()
            .ok_or_else(|| BackendError::from("shaderc options not available"))?;
        options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_1 as u32);
        options.set_target_spirv(SpirvVersion::V1_3);
        // Names are kept in both modes since reflection relies on them.
        options.set_generate_debug_info();
        if optimize {
            options.set_optimization_level(OptimizationLevel::Performance);
        }

        let artifact = compiler
            .compile_into_spirv(
                source,
                shader_kind(stage),
                &format!("{stage}.glsl"),
                entry_point,
                Some(&options),
            )
            .map_err(|e| BackendError(e.to_string()))?;
        if artifact.get_num_warnings() > 0 {
            warn!("{}", artifact.get_warning_messages().trim_end());
        }

        let words = artifact.as_binary().to_vec();
        debug!("Compiled {stage} stage to {} SPIR-V words", words.len());
        Ok(words)
    }
}

fn shader_kind(stage: ShaderStage) -> ShaderKind {
    match stage {
        ShaderStage::Vertex => ShaderKind::Vertex,
        ShaderStage::Fragment => ShaderKind::Fragment,
        ShaderStage::Compute => ShaderKind::Compute,
    }
}
