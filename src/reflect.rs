//! Reflection of portable SPIR-V binaries into JSON descriptors.

use std::collections::HashMap;

use rspirv_reflect::rspirv::dr::{Module, Operand};
use rspirv_reflect::spirv::{self, Word};
use rspirv_reflect::{BindingCount, DescriptorType, Reflection};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShaderError};

/// Resource layout of one compiled stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionDescriptor {
    /// Entry points declared by the module.
    pub entry_points: Vec<EntryPoint>,
    /// `Location`-decorated stage inputs, sorted by location.
    pub inputs: Vec<InterfaceVariable>,
    /// `Location`-decorated stage outputs, sorted by location.
    pub outputs: Vec<InterfaceVariable>,
    /// Descriptor bindings, sorted by set then binding.
    pub bindings: Vec<ResourceBinding>,
    /// Push constant block, if any.
    pub push_constants: Option<PushConstantRange>,
}

/// An `OpEntryPoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Function name.
    pub name: String,
    /// SPIR-V execution model, e.g. `Vertex` or `Fragment`.
    pub execution_model: String,
}

/// A stage input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceVariable {
    /// Debug name; empty when the binary carries none.
    pub name: String,
    /// Location decoration.
    pub location: u32,
    /// GLSL spelling of the variable's type, e.g. `vec3` or `mat4`.
    #[serde(rename = "type")]
    pub ty: String,
}

/// One descriptor binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Debug name of the variable (or its block type).
    pub name: String,
    /// Descriptor set.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Array size; `1` for non-arrays, `0` for runtime-sized arrays.
    pub count: u32,
    /// Declared size in bytes of a uniform or storage block. A trailing
    /// runtime-sized array contributes nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
}

/// Kinds of descriptor resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ResourceKind {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
    Other,
}

/// Byte range of the push constant block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConstantRange {
    /// Offset in bytes.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

impl ReflectionDescriptor {
    /// Pretty-printed JSON form, as written to the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::Descriptor`] if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a descriptor previously produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::Descriptor`] if the text is not a descriptor.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn reflection_error(e: impl std::fmt::Display) -> ShaderError {
    ShaderError::ReflectionFailed {
        reason: e.to_string(),
    }
}

/// Describe the resources of a portable SPIR-V binary.
///
/// # Errors
///
/// Returns [`ShaderError::ReflectionFailed`] if the binary cannot be parsed.
pub fn reflect(binary: &[u32]) -> Result<ReflectionDescriptor> {
    let reflection =
        Reflection::new_from_spirv(bytemuck::cast_slice(binary)).map_err(reflection_error)?;
    let module = &reflection.0;
    let types = TypeTable::new(module);

    let mut bindings = Vec::new();
    for (set, set_bindings) in reflection.get_descriptor_sets().map_err(reflection_error)? {
        for (binding, info) in set_bindings {
            let count = match info.binding_count {
                BindingCount::One => 1,
                BindingCount::StaticSized(size) => u32::try_from(size).unwrap_or(u32::MAX),
                BindingCount::Unbounded => 0,
            };
            let kind = resource_kind(info.ty);
            let block_size = match kind {
                ResourceKind::UniformBuffer | ResourceKind::StorageBuffer => {
                    types.block_size(set, binding)
                }
                _ => None,
            };
            bindings.push(ResourceBinding {
                name: info.name,
                set,
                binding,
                kind,
                count,
                block_size,
            });
        }
    }
    bindings.sort_by_key(|b| (b.set, b.binding));

    let push_constants = reflection
        .get_push_constant_range()
        .map_err(reflection_error)?
        .map(|range| PushConstantRange {
            offset: range.offset,
            size: range.size,
        });

    let entry_points = module
        .entry_points
        .iter()
        .filter_map(|instruction| match instruction.operands.as_slice() {
            [Operand::ExecutionModel(model), _, Operand::LiteralString(name), ..] => {
                Some(EntryPoint {
                    name: name.clone(),
                    execution_model: format!("{model:?}"),
                })
            }
            _ => None,
        })
        .collect();

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for instruction in &module.types_global_values {
        if instruction.class.opcode != spirv::Op::Variable {
            continue;
        }
        let (Some(id), Some(pointer)) = (instruction.result_id, instruction.result_type) else {
            continue;
        };
        let Some(&location) = types.locations.get(&id) else {
            continue;
        };
        let Some(Operand::StorageClass(storage_class)) = instruction.operands.first() else {
            continue;
        };

        let variable = InterfaceVariable {
            name: types.names.get(&id).cloned().unwrap_or_default(),
            location,
            ty: types.glsl_name(types.pointee(pointer)),
        };
        match storage_class {
            spirv::StorageClass::Input => inputs.push(variable),
            spirv::StorageClass::Output => outputs.push(variable),
            _ => {}
        }
    }
    inputs.sort_by_key(|v| v.location);
    outputs.sort_by_key(|v| v.location);

    Ok(ReflectionDescriptor {
        entry_points,
        inputs,
        outputs,
        bindings,
        push_constants,
    })
}

/// The subset of SPIR-V types a descriptor describes.
enum SpirvType {
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Word, count: u32 },
    Matrix { column: Word, columns: u32 },
    Array { element: Word, length: Word },
    RuntimeArray { element: Word },
    Struct { members: Vec<Word> },
    Pointer { pointee: Word },
}

/// Types, names, and layout decorations of one module, keyed by result id.
#[derive(Default)]
struct TypeTable {
    types: HashMap<Word, SpirvType>,
    constants: HashMap<Word, u32>,
    names: HashMap<Word, String>,
    locations: HashMap<Word, u32>,
    array_strides: HashMap<Word, u32>,
    member_offsets: HashMap<(Word, u32), u32>,
    matrix_strides: HashMap<(Word, u32), u32>,
    bindings: HashMap<(u32, u32), Word>,
}

impl TypeTable {
    fn new(module: &Module) -> Self {
        let mut table = Self::default();

        for instruction in &module.debug_names {
            if instruction.class.opcode != spirv::Op::Name {
                continue;
            }
            if let [Operand::IdRef(id), Operand::LiteralString(name), ..] =
                instruction.operands.as_slice()
            {
                table.names.insert(*id, name.clone());
            }
        }

        let mut sets = HashMap::new();
        let mut binding_slots = HashMap::new();
        for instruction in &module.annotations {
            match (instruction.class.opcode, instruction.operands.as_slice()) {
                (
                    spirv::Op::Decorate,
                    [Operand::IdRef(id), Operand::Decoration(decoration), Operand::LiteralInt32(value), ..],
                ) => {
                    let target = match decoration {
                        spirv::Decoration::Location => &mut table.locations,
                        spirv::Decoration::ArrayStride => &mut table.array_strides,
                        spirv::Decoration::DescriptorSet => &mut sets,
                        spirv::Decoration::Binding => &mut binding_slots,
                        _ => continue,
                    };
                    target.insert(*id, *value);
                }
                (
                    spirv::Op::MemberDecorate,
                    [Operand::IdRef(id), Operand::LiteralInt32(member), Operand::Decoration(decoration), Operand::LiteralInt32(value), ..],
                ) => {
                    let target = match decoration {
                        spirv::Decoration::Offset => &mut table.member_offsets,
                        spirv::Decoration::MatrixStride => &mut table.matrix_strides,
                        _ => continue,
                    };
                    target.insert((*id, *member), *value);
                }
                _ => {}
            }
        }

        for instruction in &module.types_global_values {
            let Some(id) = instruction.result_id else {
                continue;
            };
            let ty = match (instruction.class.opcode, instruction.operands.as_slice()) {
                (spirv::Op::TypeBool, _) => SpirvType::Bool,
                (spirv::Op::TypeInt, [Operand::LiteralInt32(width), Operand::LiteralInt32(signedness)]) => {
                    SpirvType::Int {
                        width: *width,
                        signed: *signedness == 1,
                    }
                }
                (spirv::Op::TypeFloat, [Operand::LiteralInt32(width), ..]) => {
                    SpirvType::Float { width: *width }
                }
                (spirv::Op::TypeVector, [Operand::IdRef(component), Operand::LiteralInt32(count)]) => {
                    SpirvType::Vector {
                        component: *component,
                        count: *count,
                    }
                }
                (spirv::Op::TypeMatrix, [Operand::IdRef(column), Operand::LiteralInt32(columns)]) => {
                    SpirvType::Matrix {
                        column: *column,
                        columns: *columns,
                    }
                }
                (spirv::Op::TypeArray, [Operand::IdRef(element), Operand::IdRef(length)]) => {
                    SpirvType::Array {
                        element: *element,
                        length: *length,
                    }
                }
                (spirv::Op::TypeRuntimeArray, [Operand::IdRef(element)]) => {
                    SpirvType::RuntimeArray { element: *element }
                }
                (spirv::Op::TypeStruct, members) => SpirvType::Struct {
                    members: members
                        .iter()
                        .filter_map(|operand| match operand {
                            Operand::IdRef(member) => Some(*member),
                            _ => None,
                        })
                        .collect(),
                },
                (spirv::Op::TypePointer, [Operand::StorageClass(_), Operand::IdRef(pointee)]) => {
                    SpirvType::Pointer { pointee: *pointee }
                }
                (spirv::Op::Constant, [Operand::LiteralInt32(value)]) => {
                    table.constants.insert(id, *value);
                    continue;
                }
                (spirv::Op::Variable, _) => {
                    if let (Some(&set), Some(&binding)) = (sets.get(&id), binding_slots.get(&id)) {
                        if let Some(pointer) = instruction.result_type {
                            table.bindings.insert((set, binding), pointer);
                        }
                    }
                    continue;
                }
                _ => continue,
            };
            table.types.insert(id, ty);
        }

        table
    }

    fn pointee(&self, id: Word) -> Word {
        match self.types.get(&id) {
            Some(SpirvType::Pointer { pointee }) => *pointee,
            _ => id,
        }
    }

    /// GLSL spelling of a type, `unknown` for anything a stage interface
    /// cannot carry.
    fn glsl_name(&self, id: Word) -> String {
        match self.types.get(&id) {
            Some(SpirvType::Bool) => "bool".to_string(),
            Some(SpirvType::Int { width: 32, signed: true }) => "int".to_string(),
            Some(SpirvType::Int { width: 32, signed: false }) => "uint".to_string(),
            Some(SpirvType::Float { width: 32 }) => "float".to_string(),
            Some(SpirvType::Float { width: 64 }) => "double".to_string(),
            Some(SpirvType::Vector { component, count }) => {
                format!("{}vec{count}", self.vector_prefix(*component))
            }
            Some(SpirvType::Matrix { column, columns }) => match self.types.get(column) {
                Some(SpirvType::Vector { component, count }) => {
                    let prefix = self.vector_prefix(*component);
                    if count == columns {
                        format!("{prefix}mat{columns}")
                    } else {
                        format!("{prefix}mat{columns}x{count}")
                    }
                }
                _ => "unknown".to_string(),
            },
            Some(SpirvType::Array { element, length }) => match self.constants.get(length) {
                Some(length) => format!("{}[{length}]", self.glsl_name(*element)),
                None => format!("{}[]", self.glsl_name(*element)),
            },
            Some(SpirvType::RuntimeArray { element }) => format!("{}[]", self.glsl_name(*element)),
            Some(SpirvType::Struct { .. }) => self
                .names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "struct".to_string()),
            _ => "unknown".to_string(),
        }
    }

    fn vector_prefix(&self, component: Word) -> &'static str {
        match self.types.get(&component) {
            Some(SpirvType::Bool) => "b",
            Some(SpirvType::Int { signed: true, .. }) => "i",
            Some(SpirvType::Int { signed: false, .. }) => "u",
            Some(SpirvType::Float { width: 64 }) => "d",
            _ => "",
        }
    }

    /// Declared size of the block bound at `set`/`binding`, looking
    /// through arrays of blocks.
    fn block_size(&self, set: u32, binding: u32) -> Option<u32> {
        let mut ty = self.pointee(*self.bindings.get(&(set, binding))?);
        while let Some(SpirvType::Array { element, .. } | SpirvType::RuntimeArray { element }) =
            self.types.get(&ty)
        {
            ty = *element;
        }
        self.struct_size(ty)
    }

    /// Offset of the last member plus that member's size.
    fn struct_size(&self, id: Word) -> Option<u32> {
        let Some(SpirvType::Struct { members }) = self.types.get(&id) else {
            return None;
        };
        let Some(last) = members.len().checked_sub(1) else {
            return Some(0);
        };
        let index = u32::try_from(last).ok()?;
        let offset = *self.member_offsets.get(&(id, index))?;
        let size = self.member_size(id, index, members[last])?;
        offset.checked_add(size)
    }

    fn member_size(&self, parent: Word, index: u32, ty: Word) -> Option<u32> {
        match self.types.get(&ty)? {
            SpirvType::Matrix { columns, .. } => {
                let stride = *self.matrix_strides.get(&(parent, index))?;
                stride.checked_mul(*columns)
            }
            _ => self.type_size(ty),
        }
    }

    fn type_size(&self, id: Word) -> Option<u32> {
        match self.types.get(&id)? {
            SpirvType::Bool => Some(4),
            SpirvType::Int { width, .. } | SpirvType::Float { width } => Some(width / 8),
            SpirvType::Vector { component, count } => self.type_size(*component)?.checked_mul(*count),
            SpirvType::Array { length, .. } => {
                let stride = *self.array_strides.get(&id)?;
                stride.checked_mul(*self.constants.get(length)?)
            }
            SpirvType::RuntimeArray { .. } => Some(0),
            SpirvType::Struct { .. } => self.struct_size(id),
            SpirvType::Matrix { .. } | SpirvType::Pointer { .. } => None,
        }
    }
}

fn resource_kind(ty: DescriptorType) -> ResourceKind {
    match ty {
        DescriptorType::SAMPLER => ResourceKind::Sampler,
        DescriptorType::COMBINED_IMAGE_SAMPLER => ResourceKind::CombinedImageSampler,
        DescriptorType::SAMPLED_IMAGE => ResourceKind::SampledImage,
        DescriptorType::STORAGE_IMAGE => ResourceKind::StorageImage,
        DescriptorType::UNIFORM_TEXEL_BUFFER => ResourceKind::UniformTexelBuffer,
        DescriptorType::STORAGE_TEXEL_BUFFER => ResourceKind::StorageTexelBuffer,
        DescriptorType::UNIFORM_BUFFER | DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
            ResourceKind::UniformBuffer
        }
        DescriptorType::STORAGE_BUFFER | DescriptorType::STORAGE_BUFFER_DYNAMIC => {
            ResourceKind::StorageBuffer
        }
        DescriptorType::INPUT_ATTACHMENT => ResourceKind::InputAttachment,
        _ => ResourceKind::Other,
    }
}
