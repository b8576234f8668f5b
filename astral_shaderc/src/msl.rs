//! Cross compile SPIR-V to Metal Shading Language.
//!
//! Vulkan style `(set, binding)` pairs do not exist in Metal.
//! Each resource is instead assigned a flat index into the buffer, texture,
//! or sampler argument table of the stage.
//! The same indices are written to the artifact as `mslBinding`.
use log::debug;

use crate::{
    error::BackendError,
    ir::{IrBackend, IrResource, IrResources, MslBinding, MslSlot},
};

/// The first Metal buffer index used for uniform buffers.
///
/// Lower buffer indices are left free for vertex buffers.
pub const MSL_UNIFORM_BINDING_START: u32 = 8;

/// The resource category used for assigning flat bindings.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FlatCategory {
    Uniform,
    Image,
    InputAttachment,
    Sampler,
    StorageBuffer,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FlatResource {
    pub category: FlatCategory,
    /// The Vulkan binding. Only used for uniforms.
    pub binding: u32,
    /// The outermost array length or 0 if the resource is not an array.
    pub array_length: u32,
}

/// Assign a flat Metal index to each resource in `resources`.
///
/// Uniforms use their binding offset by [MSL_UNIFORM_BINDING_START].
/// Images come first in the texture table followed by input attachments.
/// Samplers and storage buffers have their own counters.
/// Arrays of images or samplers take up one index per element.
/// Indices saturate at [u32::MAX].
pub fn assign_flat_bindings(resources: &[FlatResource]) -> Vec<u32> {
    let mut flat = vec![0; resources.len()];

    let mut assign = |category: FlatCategory, counter: &mut u32| {
        for (i, resource) in resources.iter().enumerate() {
            if resource.category == category {
                flat[i] = *counter;
                let count = match category {
                    FlatCategory::Image | FlatCategory::Sampler => resource.array_length.max(1),
                    _ => 1,
                };
                *counter = counter.saturating_add(count);
            }
        }
    };

    let mut texture = 0;
    assign(FlatCategory::Image, &mut texture);
    assign(FlatCategory::InputAttachment, &mut texture);

    let mut sampler = 0;
    assign(FlatCategory::Sampler, &mut sampler);

    let mut buffer = 0;
    assign(FlatCategory::StorageBuffer, &mut buffer);

    for (i, resource) in resources.iter().enumerate() {
        if resource.category == FlatCategory::Uniform {
            flat[i] = resource.binding.saturating_add(MSL_UNIFORM_BINDING_START);
        }
    }

    flat
}

/// Flat Metal indices for each resource in [IrResources] in the same order.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct FlatBindings {
    pub uniform_buffers: Vec<u32>,
    pub images: Vec<u32>,
    pub samplers: Vec<u32>,
    pub input_attachments: Vec<u32>,
    pub storage_buffers: Vec<u32>,
}

impl FlatBindings {
    pub fn new(resources: &IrResources) -> Self {
        let categories = [
            (FlatCategory::Uniform, &resources.uniform_buffers),
            (FlatCategory::Image, &resources.separate_images),
            (FlatCategory::Sampler, &resources.separate_samplers),
            (FlatCategory::InputAttachment, &resources.subpass_inputs),
            (FlatCategory::StorageBuffer, &resources.storage_buffers),
        ];

        let flat_resources: Vec<_> = categories
            .iter()
            .flat_map(|(category, list)| {
                list.iter().map(|r| FlatResource {
                    category: *category,
                    binding: r.binding,
                    array_length: r.array_dimensions.first().copied().unwrap_or(0),
                })
            })
            .collect();

        let mut flat = assign_flat_bindings(&flat_resources).into_iter();
        let mut take = |count: usize| flat.by_ref().take(count).collect::<Vec<_>>();

        Self {
            uniform_buffers: take(resources.uniform_buffers.len()),
            images: take(resources.separate_images.len()),
            samplers: take(resources.separate_samplers.len()),
            input_attachments: take(resources.subpass_inputs.len()),
            storage_buffers: take(resources.storage_buffers.len()),
        }
    }

    /// The [MslBinding] for each resource in `resources`.
    pub fn msl_bindings(&self, resources: &IrResources) -> Vec<MslBinding> {
        let mut bindings = Vec::new();
        let mut add = |list: &[IrResource], flat: &[u32], slot: fn(u32) -> MslSlot| {
            bindings.extend(list.iter().zip(flat).map(|(r, f)| MslBinding {
                set: r.set,
                binding: r.binding,
                slot: slot(*f),
            }));
        };
        add(&resources.uniform_buffers, &self.uniform_buffers, MslSlot::Buffer);
        add(&resources.separate_images, &self.images, MslSlot::Texture);
        add(&resources.separate_samplers, &self.samplers, MslSlot::Sampler);
        add(&resources.subpass_inputs, &self.input_attachments, MslSlot::Texture);
        add(&resources.storage_buffers, &self.storage_buffers, MslSlot::Buffer);
        bindings
    }
}

/// Parse `spirv` and generate MSL with flat bindings for every resource.
pub fn cross_compile<B: IrBackend>(backend: &B, spirv: &[u32]) -> Result<String, BackendError> {
    let mut module = backend.parse(spirv)?;
    let resources = backend.resources(&mut module)?;
    let bindings = FlatBindings::new(&resources).msl_bindings(&resources);
    debug!("Assigned MSL slots {bindings:?}");
    backend.compile_msl(&mut module, &bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn flat(category: FlatCategory, array_length: u32) -> FlatResource {
        FlatResource {
            category,
            binding: 0,
            array_length,
        }
    }

    fn resource(name: &str, set: u32, binding: u32, array_dimensions: Vec<u32>) -> IrResource {
        IrResource {
            name: name.to_string(),
            set,
            binding,
            array_dimensions,
            ..Default::default()
        }
    }

    #[test]
    fn flat_bindings_empty() {
        assert!(assign_flat_bindings(&[]).is_empty());
    }

    #[test]
    fn flat_bindings_images_non_array_and_array() {
        assert_eq!(
            vec![0, 1],
            assign_flat_bindings(&[flat(FlatCategory::Image, 1), flat(FlatCategory::Image, 3)])
        );
        assert_eq!(
            vec![0, 3, 4],
            assign_flat_bindings(&[
                flat(FlatCategory::Image, 3),
                flat(FlatCategory::Image, 0),
                flat(FlatCategory::Image, 0)
            ])
        );
    }

    #[test]
    fn flat_bindings_input_attachments_after_images() {
        // Input attachments are assigned after all images regardless of order.
        assert_eq!(
            vec![3, 0, 4, 2],
            assign_flat_bindings(&[
                flat(FlatCategory::InputAttachment, 0),
                flat(FlatCategory::Image, 2),
                flat(FlatCategory::InputAttachment, 0),
                flat(FlatCategory::Image, 0),
            ])
        );
    }

    #[test]
    fn flat_bindings_samplers_and_buffers() {
        assert_eq!(
            vec![0, 4, 0, 1, 2],
            assign_flat_bindings(&[
                flat(FlatCategory::Sampler, 4),
                flat(FlatCategory::Sampler, 0),
                flat(FlatCategory::StorageBuffer, 0),
                flat(FlatCategory::StorageBuffer, 7),
                flat(FlatCategory::StorageBuffer, 0),
            ])
        );
    }

    #[test]
    fn flat_bindings_uniforms() {
        assert_eq!(
            vec![8, 11],
            assign_flat_bindings(&[
                FlatResource {
                    category: FlatCategory::Uniform,
                    binding: 0,
                    array_length: 0
                },
                FlatResource {
                    category: FlatCategory::Uniform,
                    binding: 3,
                    array_length: 0
                },
            ])
        );
    }

    #[test]
    fn flat_bindings_saturate() {
        assert_eq!(
            vec![u32::MAX, 0, u32::MAX, u32::MAX, 0],
            assign_flat_bindings(&[
                FlatResource {
                    category: FlatCategory::Uniform,
                    binding: u32::MAX,
                    array_length: 0
                },
                flat(FlatCategory::Image, u32::MAX),
                flat(FlatCategory::Image, 2),
                flat(FlatCategory::InputAttachment, 0),
                flat(FlatCategory::Sampler, u32::MAX),
            ])
        );
    }

    #[test]
    fn flat_bindings_from_resources() {
        let resources = IrResources {
            uniform_buffers: vec![resource("Matrices", 0, 1, Vec::new())],
            separate_images: vec![
                resource("albedo", 0, 2, Vec::new()),
                resource("layers", 0, 3, vec![4]),
            ],
            separate_samplers: vec![resource("linear", 0, 4, Vec::new())],
            subpass_inputs: vec![resource("gbuffer", 0, 5, Vec::new())],
            storage_buffers: vec![resource("Lights", 1, 0, Vec::new())],
        };
        let flat = FlatBindings::new(&resources);
        assert_eq!(
            FlatBindings {
                uniform_buffers: vec![9],
                images: vec![0, 1],
                samplers: vec![0],
                input_attachments: vec![5],
                storage_buffers: vec![0],
            },
            flat
        );

        assert_eq!(
            vec![
                MslBinding {
                    set: 0,
                    binding: 1,
                    slot: MslSlot::Buffer(9)
                },
                MslBinding {
                    set: 0,
                    binding: 2,
                    slot: MslSlot::Texture(0)
                },
                MslBinding {
                    set: 0,
                    binding: 3,
                    slot: MslSlot::Texture(1)
                },
                MslBinding {
                    set: 0,
                    binding: 4,
                    slot: MslSlot::Sampler(0)
                },
                MslBinding {
                    set: 0,
                    binding: 5,
                    slot: MslSlot::Texture(5)
                },
                MslBinding {
                    set: 1,
                    binding: 0,
                    slot: MslSlot::Buffer(0)
                },
            ],
            flat.msl_bindings(&resources)
        );
    }
}
