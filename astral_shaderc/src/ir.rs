//! A backend agnostic view of compiled SPIR-V modules.
//!
//! Reflection and cross compilation only need resource declarations and an
//! MSL writer, so the backend is hidden behind [IrBackend].
//! [SpirvCrossIr] implements it with SPIRV-Cross.
use crate::error::BackendError;

mod cross;
pub use cross::{CrossModule, SpirvCrossIr};

/// Resource declarations grouped by category like SPIR-V reflection tools.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct IrResources {
    pub uniform_buffers: Vec<IrResource>,
    /// Sampled images declared without a sampler like `texture2D`.
    pub separate_images: Vec<IrResource>,
    pub separate_samplers: Vec<IrResource>,
    pub subpass_inputs: Vec<IrResource>,
    pub storage_buffers: Vec<IrResource>,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct IrResource {
    /// The block name for buffers and the variable name otherwise.
    pub name: String,
    pub set: u32,
    pub binding: u32,
    /// Array dimensions from outermost to innermost with 0 for runtime sized arrays.
    pub array_dimensions: Vec<u32>,
    /// The `InputAttachmentIndex` decoration for subpass inputs.
    pub input_attachment_index: u32,
    /// The declared size in bytes of a buffer block.
    pub block_size: Option<usize>,
    /// The struct type of the first block member with arrays removed.
    pub element_struct: Option<IrStruct>,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct IrStruct {
    pub name: Option<String>,
    pub members: Vec<IrStructMember>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct IrStructMember {
    pub name: String,
    /// The declared size in bytes if known.
    pub size: Option<usize>,
}

/// The Metal argument table and index for a resource.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MslSlot {
    Buffer(u32),
    Texture(u32),
    Sampler(u32),
}

/// Assign the resource at `set` and `binding` to `slot` in the generated MSL.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MslBinding {
    pub set: u32,
    pub binding: u32,
    pub slot: MslSlot,
}

/// Parsing, resource listing, and MSL generation for SPIR-V modules.
pub trait IrBackend {
    type Module;

    fn parse(&self, spirv: &[u32]) -> Result<Self::Module, BackendError>;

    fn resources(&self, module: &mut Self::Module) -> Result<IrResources, BackendError>;

    /// Generate MSL 2.0 source using the provided slots for each resource.
    fn compile_msl(
        &self,
        module: &mut Self::Module,
        bindings: &[MslBinding],
    ) -> Result<String, BackendError>;
}
