//! Merge the per stage resources of an artifact into a single binding table.
//!
//! Renderers create one descriptor layout per shader program,
//! so a resource used by both stages must have the same name and type.
use bitflags::bitflags;
use indexmap::{map::Entry, IndexMap};
use log::trace;

use crate::{
    artifact::{ShaderArtifact, StageArtifact},
    error::LoadBindingsError,
};

bitflags! {
    /// The stages that access a resource.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct StageFlags: u32 {
        const VERTEX = 1;
        const FRAGMENT = 2;
        const COMPUTE = 4;
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub set: u32,
    pub binding: u32,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResourceKind {
    /// A uniform buffer with the given size in bytes.
    Uniform { size: usize },
    Texture { array_length: u32 },
    Sampler { array_length: u32 },
    InputAttachment { index: u32 },
    StorageBuffer,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BoundResource {
    pub name: String,
    pub kind: ResourceKind,
    pub accessed_by: StageFlags,
}

/// The resources for all stages of a shader program.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ShaderBindings {
    pub resources: IndexMap<BindingKey, BoundResource>,
}

impl ShaderBindings {
    pub fn from_artifact(artifact: &ShaderArtifact) -> Result<Self, LoadBindingsError> {
        let stages = match (&artifact.compute, &artifact.vertex, &artifact.fragment) {
            (Some(compute), _, _) => vec![(StageFlags::COMPUTE, compute)],
            (None, Some(vertex), Some(fragment)) => vec![
                (StageFlags::VERTEX, vertex),
                (StageFlags::FRAGMENT, fragment),
            ],
            _ => return Err(LoadBindingsError::MissingStages),
        };

        let mut bindings = Self::default();
        for (stage, artifact) in stages {
            bindings.add_stage(stage, artifact)?;
        }
        Ok(bindings)
    }

    pub fn get(&self, set: u32, binding: u32) -> Option<&BoundResource> {
        self.resources.get(&BindingKey { set, binding })
    }

    /// Find the binding for the resource with the given name.
    pub fn binding_of(&self, name: &str) -> Option<BindingKey> {
        self.resources
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(key, _)| *key)
    }

    fn add_stage(&mut self, stage: StageFlags, artifact: &StageArtifact) -> Result<(), LoadBindingsError> {
        let variables = &artifact.variables;
        for u in &variables.uniforms {
            let kind = ResourceKind::Uniform { size: u.size };
            self.insert(stage, u.set, u.binding, &u.name, kind)?;
        }
        for i in &variables.images {
            let kind = ResourceKind::Texture {
                array_length: i.array_length,
            };
            self.insert(stage, i.set, i.binding, &i.name, kind)?;
        }
        for s in &variables.samplers {
            let kind = ResourceKind::Sampler {
                array_length: s.array_length,
            };
            self.insert(stage, s.set, s.binding, &s.name, kind)?;
        }
        for a in &variables.input_attachments {
            let kind = ResourceKind::InputAttachment { index: a.index };
            self.insert(stage, a.set, a.binding, &a.name, kind)?;
        }
        for b in &variables.storage_buffers {
            self.insert(stage, b.set, b.binding, &b.name, ResourceKind::StorageBuffer)?;
        }
        Ok(())
    }

    fn insert(
        &mut self,
        stage: StageFlags,
        set: u32,
        binding: u32,
        name: &str,
        kind: ResourceKind,
    ) -> Result<(), LoadBindingsError> {
        match self.resources.entry(BindingKey { set, binding }) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.name != name || existing.kind != kind {
                    return Err(LoadBindingsError::BindingConflict {
                        set,
                        binding,
                        existing: existing.name.clone(),
                        new: name.to_string(),
                    });
                }
                existing.accessed_by |= stage;
            }
            Entry::Vacant(entry) => {
                trace!("{name:?} at set {set} binding {binding}");
                entry.insert(BoundResource {
                    name: name.to_string(),
                    kind,
                    accessed_by: stage,
                });
            }
        }
        Ok(())
    }
}
