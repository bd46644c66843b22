use std::collections::BTreeSet;

use wgpu::naga::{AddressSpace, Binding, Module, ScalarKind, ShaderStage, TypeInner};

use crate::compile::TranslatedStage;
use crate::types::StageKind;

/// Location of a float uniform inside the program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    offset: u32,
    components: u32,
}

impl UniformLocation {
    /// Byte offset inside the std140 block.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of `f32` lanes the uniform holds.
    pub fn components(&self) -> u32 {
        self.components
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VertexInput {
    pub name: Option<String>,
    pub location: u32,
    pub components: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformMember {
    pub name: String,
    pub location: UniformLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

/// Everything a linked program exposes by name.
///
/// wgpu binds by location, so linking walks the naga IR of both stages once
/// and answers name queries the way a GL driver would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProgramLayout {
    pub inputs: Vec<VertexInput>,
    pub uniforms: Option<UniformBlock>,
}

impl ProgramLayout {
    /// Checks that the stages form a program and collects their named inputs.
    ///
    /// Errors carry the text reported as the program's link log.
    pub fn link(vertex: &TranslatedStage, fragment: &TranslatedStage) -> Result<Self, String> {
        if !has_entry_point(&vertex.module, ShaderStage::Vertex) {
            return Err("no vertex entry point in the attached vertex stage".to_string());
        }
        if !has_entry_point(&fragment.module, ShaderStage::Fragment) {
            return Err("no fragment entry point in the attached fragment stage".to_string());
        }

        let produced = vertex_outputs(&vertex.module);
        for location in fragment_inputs(&fragment.module) {
            if !produced.contains(&location) {
                return Err(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                ));
            }
        }

        let mut blocks = uniform_blocks(&vertex.module);
        blocks.extend(uniform_blocks(&fragment.module));
        let uniforms = merge_blocks(blocks)?;

        Ok(Self {
            inputs: vertex_inputs(&vertex.module),
            uniforms,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.inputs
            .iter()
            .find(|input| input.name.as_deref() == Some(name))
            .map(|input| input.location)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .as_ref()?
            .members
            .iter()
            .find(|member| member.name == name)
            .map(|member| member.location)
    }

    /// Size in bytes of the uniform block, zero when the program has none.
    pub fn uniform_size(&self) -> u32 {
        self.uniforms.as_ref().map_or(0, |block| block.size)
    }
}

/// Picks the vertex and fragment stage out of a program's attachments.
///
/// Each entry is the stage kind plus its translation, or the reason the
/// attachment cannot take part in linking.
pub(crate) fn pair_stages<'a, T>(
    attached: impl IntoIterator<Item = Result<(StageKind, &'a T), String>>,
) -> Result<(&'a T, &'a T), String> {
    let mut vertex = None;
    let mut fragment = None;
    for entry in attached {
        let (kind, stage) = entry?;
        let slot = match kind {
            StageKind::Vertex => &mut vertex,
            StageKind::Fragment => &mut fragment,
        };
        if slot.replace(stage).is_some() {
            return Err(format!("more than one {kind} stage attached"));
        }
    }
    match (vertex, fragment) {
        (Some(vertex), Some(fragment)) => Ok((vertex, fragment)),
        _ => Err("a program needs one vertex and one fragment stage".to_string()),
    }
}

fn has_entry_point(module: &Module, stage: ShaderStage) -> bool {
    module.entry_points.iter().any(|entry| entry.stage == stage)
}

fn float_components(module: &Module, ty: wgpu::naga::Handle<wgpu::naga::Type>) -> Option<u32> {
    match module.types[ty].inner {
        TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Float => Some(1),
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(size as u32),
        _ => None,
    }
}

fn location_of(binding: &Option<Binding>) -> Option<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => Some(*location),
        _ => None,
    }
}

pub(crate) fn vertex_inputs(module: &Module) -> Vec<VertexInput> {
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == ShaderStage::Vertex)
    else {
        return Vec::new();
    };

    entry
        .function
        .arguments
        .iter()
        .filter_map(|argument| {
            let location = location_of(&argument.binding)?;
            let components = float_components(module, argument.ty)?;
            Some(VertexInput {
                name: argument.name.clone(),
                location,
                components,
            })
        })
        .collect()
}

fn vertex_outputs(module: &Module) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    let Some(result) = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == ShaderStage::Vertex)
        .and_then(|entry| entry.function.result.as_ref())
    else {
        return locations;
    };

    if let Some(location) = location_of(&result.binding) {
        locations.insert(location);
    } else if let TypeInner::Struct { members, .. } = &module.types[result.ty].inner {
        locations.extend(members.iter().filter_map(|member| location_of(&member.binding)));
    }
    locations
}

fn fragment_inputs(module: &Module) -> Vec<u32> {
    module
        .entry_points
        .iter()
        .filter(|entry| entry.stage == ShaderStage::Fragment)
        .flat_map(|entry| entry.function.arguments.iter())
        .filter_map(|argument| location_of(&argument.binding))
        .collect()
}

pub(crate) fn uniform_blocks(module: &Module) -> Vec<UniformBlock> {
    module
        .global_variables
        .iter()
        .filter(|(_, variable)| variable.space == AddressSpace::Uniform)
        .filter_map(|(_, variable)| {
            let binding = variable.binding.as_ref()?;
            let TypeInner::Struct { members, span } = &module.types[variable.ty].inner else {
                return None;
            };
            let members = members
                .iter()
                .filter_map(|member| {
                    Some(UniformMember {
                        name: member.name.clone()?,
                        location: UniformLocation {
                            offset: member.offset,
                            components: float_components(module, member.ty)?,
                        },
                    })
                })
                .collect();
            Some(UniformBlock {
                group: binding.group,
                binding: binding.binding,
                size: *span,
                members,
            })
        })
        .collect()
}

/// Both stages may declare the same block; anything beyond one block at
/// group 0, binding 0 is rejected.
fn merge_blocks(blocks: Vec<UniformBlock>) -> Result<Option<UniformBlock>, String> {
    let mut merged: Option<UniformBlock> = None;
    for block in blocks {
        if block.group != 0 || block.binding != 0 {
            return Err(format!(
                "uniform block at set {} binding {} is not supported; use set 0 binding 0",
                block.group, block.binding
            ));
        }
        match merged.as_mut() {
            None => merged = Some(block),
            Some(existing) => {
                for member in block.members {
                    match existing.members.iter().find(|m| m.name == member.name) {
                        Some(known) if known.location != member.location => {
                            return Err(format!(
                                "uniform `{}` has conflicting layouts between stages",
                                member.name
                            ));
                        }
                        Some(_) => {}
                        None => existing.members.push(member),
                    }
                }
                existing.size = existing.size.max(block.size);
            }
        }
    }
    Ok(merged)
}
