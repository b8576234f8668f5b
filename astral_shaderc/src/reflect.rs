//! Reflect resource declarations from compiled SPIR-V.
use std::collections::HashMap;

use indexmap::IndexMap;
use log::{trace, warn};

use crate::{
    error::ReflectError,
    ir::{IrBackend, IrResource, IrResources},
    msl::{FlatBindings, FlatCategory},
    ArrayResource, InputAttachment, Material, MaterialParameter, ShaderVariables, StorageBuffer,
    Uniform,
};

/// Parse `spirv` and list its resources.
///
/// Storage buffers whose element struct matches a material in `materials`
/// fill in that material's parameters if they are not already known.
pub fn reflect_stage<B: IrBackend>(
    backend: &B,
    spirv: &[u32],
    materials: &mut IndexMap<String, Material>,
) -> Result<ShaderVariables, ReflectError> {
    let mut module = backend.parse(spirv)?;
    let resources = backend.resources(&mut module)?;
    shader_variables(&resources, materials)
}

/// Convert backend resources to [ShaderVariables] with flat MSL bindings.
pub fn shader_variables(
    resources: &IrResources,
    materials: &mut IndexMap<String, Material>,
) -> Result<ShaderVariables, ReflectError> {
    check_unique(FlatCategory::Uniform, &resources.uniform_buffers)?;
    check_unique(FlatCategory::Image, &resources.separate_images)?;
    check_unique(FlatCategory::Sampler, &resources.separate_samplers)?;
    check_unique(FlatCategory::InputAttachment, &resources.subpass_inputs)?;
    check_unique(FlatCategory::StorageBuffer, &resources.storage_buffers)?;

    let flat = FlatBindings::new(resources);

    let uniforms = resources
        .uniform_buffers
        .iter()
        .map(|r| Uniform {
            name: r.name.clone(),
            size: r.block_size.unwrap_or_else(|| {
                warn!("Unable to determine size of uniform buffer {:?}", r.name);
                0
            }),
            set: r.set,
            binding: r.binding,
        })
        .collect();

    let images = array_resources(&resources.separate_images, &flat.images);
    let samplers = array_resources(&resources.separate_samplers, &flat.samplers);

    let input_attachments = resources
        .subpass_inputs
        .iter()
        .zip(&flat.input_attachments)
        .map(|(r, msl_binding)| InputAttachment {
            name: r.name.clone(),
            index: r.input_attachment_index,
            set: r.set,
            binding: r.binding,
            msl_binding: *msl_binding,
        })
        .collect();

    let storage_buffers = resources
        .storage_buffers
        .iter()
        .zip(&flat.storage_buffers)
        .map(|(r, msl_binding)| {
            assign_material_parameters(r, materials);
            StorageBuffer {
                name: r.name.clone(),
                set: r.set,
                binding: r.binding,
                msl_binding: *msl_binding,
            }
        })
        .collect();

    Ok(ShaderVariables {
        uniforms,
        images,
        samplers,
        input_attachments,
        storage_buffers,
    })
}

fn array_resources(resources: &[IrResource], flat: &[u32]) -> Vec<ArrayResource> {
    resources
        .iter()
        .zip(flat)
        .map(|(r, msl_binding)| ArrayResource {
            name: r.name.clone(),
            array_length: r.array_dimensions.first().copied().unwrap_or(0),
            set: r.set,
            binding: r.binding,
            msl_binding: *msl_binding,
        })
        .collect()
}

fn assign_material_parameters(buffer: &IrResource, materials: &mut IndexMap<String, Material>) {
    let Some(element) = &buffer.element_struct else {
        return;
    };
    let Some(material) = element
        .name
        .as_ref()
        .and_then(|name| materials.get_mut(name))
    else {
        return;
    };

    // The first stage to reference a material determines its parameters.
    if material.parameters.is_none() {
        trace!("Material parameters from storage buffer {:?}", buffer.name);
        material.parameters = Some(
            element
                .members
                .iter()
                .map(|m| MaterialParameter {
                    name: m.name.clone(),
                    size: m.size.unwrap_or_else(|| {
                        warn!("Unable to determine size of material parameter {:?}", m.name);
                        0
                    }),
                })
                .collect(),
        );
    }
}

fn check_unique(category: FlatCategory, resources: &[IrResource]) -> Result<(), ReflectError> {
    let mut names = HashMap::new();
    for r in resources {
        if let Some(first) = names.insert((r.set, r.binding), &r.name) {
            return Err(ReflectError::DuplicateBinding {
                category,
                set: r.set,
                binding: r.binding,
                first: first.clone(),
                second: r.name.clone(),
            });
        }
    }
    Ok(())
}
