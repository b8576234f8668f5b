use std::collections::HashMap;

use log::trace;
use spirv_cross::{
    msl,
    spirv::{self, Decoration, Type},
    ErrorCode,
};

use super::{IrBackend, IrResource, IrResources, IrStruct, IrStructMember, MslBinding, MslSlot};
use crate::error::BackendError;

/// Reserved buffer index for runtime sized array lengths in generated MSL.
const MSL_SIZES_BUFFER_SLOT: u32 = 30;

const SPIRV_MAGIC: u32 = 0x07230203;
const OP_TYPE_ARRAY: u32 = 28;
const OP_TYPE_RUNTIME_ARRAY: u32 = 29;
const OP_FUNCTION: u32 = 54;

/// An [IrBackend] using SPIRV-Cross for reflection and MSL generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpirvCrossIr;

pub struct CrossModule {
    ast: spirv::Ast<msl::Target>,
    /// The element type for each array type.
    array_elements: HashMap<u32, u32>,
}

impl IrBackend for SpirvCrossIr {
    type Module = CrossModule;

    fn parse(&self, spirv: &[u32]) -> Result<CrossModule, BackendError> {
        if spirv.first() != Some(&SPIRV_MAGIC) {
            return Err(BackendError::from("invalid SPIR-V magic number"));
        }
        let module = spirv::Module::from_words(spirv);
        let ast = spirv::Ast::<msl::Target>::parse(&module).map_err(cross_error)?;
        Ok(CrossModule {
            ast,
            array_elements: array_element_types(spirv),
        })
    }

    fn resources(&self, module: &mut CrossModule) -> Result<IrResources, BackendError> {
        let shader_resources = module.ast.get_shader_resources().map_err(cross_error)?;

        let mut resources = IrResources::default();
        for r in &shader_resources.uniform_buffers {
            let size = module
                .ast
                .get_declared_struct_size(r.base_type_id)
                .map_err(cross_error)?;
            resources.uniform_buffers.push(IrResource {
                block_size: Some(size as usize),
                ..resource(module, r)?
            });
        }
        for r in &shader_resources.separate_images {
            resources.separate_images.push(resource(module, r)?);
        }
        for r in &shader_resources.separate_samplers {
            resources.separate_samplers.push(resource(module, r)?);
        }
        for r in &shader_resources.subpass_inputs {
            let index = module
                .ast
                .get_decoration(r.id, Decoration::InputAttachmentIndex)
                .map_err(cross_error)?;
            resources.subpass_inputs.push(IrResource {
                input_attachment_index: index,
                ..resource(module, r)?
            });
        }
        for r in &shader_resources.storage_buffers {
            resources.storage_buffers.push(IrResource {
                element_struct: element_struct(module, r.base_type_id)?,
                ..resource(module, r)?
            });
        }

        Ok(resources)
    }

    fn compile_msl(
        &self,
        module: &mut CrossModule,
        bindings: &[MslBinding],
    ) -> Result<String, BackendError> {
        let mut options = msl::CompilerOptions::default();
        options.version = msl::Version::V2_0;
        options.buffer_size_buffer_index = MSL_SIZES_BUFFER_SLOT;

        let entry_points = module.ast.get_entry_points().map_err(cross_error)?;
        for entry in &entry_points {
            for binding in bindings {
                let (buffer_id, texture_id, sampler_id) = match binding.slot {
                    MslSlot::Buffer(slot) => (slot, 0, 0),
                    MslSlot::Texture(slot) => (0, slot, 0),
                    MslSlot::Sampler(slot) => (0, 0, slot),
                };
                options.resource_binding_overrides.insert(
                    msl::ResourceBindingLocation {
                        stage: entry.execution_model,
                        desc_set: binding.set,
                        binding: binding.binding,
                    },
                    msl::ResourceBinding {
                        buffer_id,
                        texture_id,
                        sampler_id,
                        count: 0,
                    },
                );
            }
        }

        module
            .ast
            .set_compiler_options(&options)
            .map_err(cross_error)?;
        module.ast.compile().map_err(cross_error)
    }
}

fn cross_error(e: ErrorCode) -> BackendError {
    match e {
        ErrorCode::CompilationError(message) => BackendError(message),
        ErrorCode::Unhandled => BackendError::from("unhandled SPIRV-Cross error"),
    }
}

fn resource(module: &CrossModule, r: &spirv::Resource) -> Result<IrResource, BackendError> {
    let ast = &module.ast;
    let resource = IrResource {
        name: r.name.clone(),
        set: ast
            .get_decoration(r.id, Decoration::DescriptorSet)
            .map_err(cross_error)?,
        binding: ast
            .get_decoration(r.id, Decoration::Binding)
            .map_err(cross_error)?,
        array_dimensions: array_dimensions(&ast.get_type(r.type_id).map_err(cross_error)?),
        ..Default::default()
    };
    trace!("{resource:?}");
    Ok(resource)
}

/// Array dimensions from outermost to innermost.
fn array_dimensions(ty: &Type) -> Vec<u32> {
    // SPIRV-Cross stores the outermost dimension last.
    let array = match ty {
        Type::Struct { array, .. }
        | Type::Image { array, .. }
        | Type::SampledImage { array, .. }
        | Type::Sampler { array, .. } => array,
        _ => return Vec::new(),
    };
    array.iter().rev().copied().collect()
}

/// The struct type of the first member of the block `block_type` with arrays removed.
fn element_struct(
    module: &mut CrossModule,
    block_type: u32,
) -> Result<Option<IrStruct>, BackendError> {
    let Type::Struct { member_types, .. } = module.ast.get_type(block_type).map_err(cross_error)?
    else {
        return Ok(None);
    };
    let Some(mut element) = member_types.first().copied() else {
        return Ok(None);
    };
    while let Some(base) = module.array_elements.get(&element) {
        element = *base;
    }

    let Type::Struct { member_types, .. } = module.ast.get_type(element).map_err(cross_error)?
    else {
        return Ok(None);
    };

    let name = module.ast.get_name(element).map_err(cross_error)?;
    let members = (0..member_types.len() as u32)
        .map(|i| {
            Ok(IrStructMember {
                name: module
                    .ast
                    .get_member_name(element, i)
                    .map_err(cross_error)?,
                size: module
                    .ast
                    .get_declared_struct_member_size(element, i)
                    .ok()
                    .map(|size| size as usize),
            })
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    Ok(Some(IrStruct {
        name: (!name.is_empty()).then_some(name),
        members,
    }))
}

/// Map each `OpTypeArray` and `OpTypeRuntimeArray` result id to its element type id.
fn array_element_types(words: &[u32]) -> HashMap<u32, u32> {
    let mut elements = HashMap::new();

    // Skip the 5 word header.
    let mut i = 5;
    while i < words.len() {
        let word_count = (words[i] >> 16) as usize;
        let op = words[i] & 0xFFFF;
        if word_count == 0 || i + word_count > words.len() {
            break;
        }

        match op {
            OP_TYPE_ARRAY | OP_TYPE_RUNTIME_ARRAY if word_count >= 3 => {
                elements.insert(words[i + 1], words[i + 2]);
            }
            // Types are only declared before the first function.
            OP_FUNCTION => break,
            _ => (),
        }

        i += word_count;
    }

    elements
}
