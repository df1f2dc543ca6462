//! Stage, target, and artifact identifiers.
//!
//! These are the keys used everywhere else in the crate. Platform values
//! (GL enums, shaderc kinds) are only produced at the device and compiler
//! boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One programmable stage of a graphics pipeline.
///
/// The derived ordering is the stable iteration order used for compilation,
/// cache lookups, and descriptor logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment (pixel) stage.
    Fragment,
}

impl ShaderStage {
    /// Every stage, in iteration order. All of them are required to build a
    /// program.
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    /// The line that switches a shader definition file to this stage.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "#vertexShader",
            ShaderStage::Fragment => "#fragmentShader",
        }
    }

    /// Parse a marker line. The match is exact: surrounding whitespace makes
    /// the line ordinary content.
    #[must_use]
    pub fn from_marker(line: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.marker() == line)
    }

    /// Human-readable name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    /// Prefix of every cache file extension for this stage.
    fn cache_prefix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "pixel",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Environment a stage is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetEnv {
    /// Vulkan-flavoured SPIR-V, used for reflection.
    PortableIr,
    /// OpenGL-flavoured SPIR-V, loaded into the driver.
    NativeExecution,
}

impl fmt::Display for TargetEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetEnv::PortableIr => "vulkan",
            TargetEnv::NativeExecution => "opengl",
        })
    }
}

/// What a cache artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A compiled binary for the given target.
    Binary(TargetEnv),
    /// A JSON reflection descriptor.
    Descriptor,
}

impl ArtifactKind {
    /// File extension (including the leading dot) of an artifact of this kind
    /// for `stage`.
    #[must_use]
    pub fn extension(self, stage: ShaderStage) -> String {
        let suffix = match self {
            ArtifactKind::Binary(TargetEnv::PortableIr) => "vshader",
            ArtifactKind::Binary(TargetEnv::NativeExecution) => "glshader",
            ArtifactKind::Descriptor => "desc.json",
        };
        format!(".{}{suffix}", stage.cache_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_exact() {
        assert_eq!(
            ShaderStage::from_marker("#vertexShader"),
            Some(ShaderStage::Vertex)
        );
        assert_eq!(
            ShaderStage::from_marker("#fragmentShader"),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_marker(" #vertexShader"), None);
        assert_eq!(ShaderStage::from_marker("#vertexShader "), None);
        assert_eq!(ShaderStage::from_marker("#geometryShader"), None);
    }

    #[test]
    fn cache_extensions() {
        let vertex = ShaderStage::Vertex;
        let fragment = ShaderStage::Fragment;
        let portable = ArtifactKind::Binary(TargetEnv::PortableIr);
        let native = ArtifactKind::Binary(TargetEnv::NativeExecution);

        assert_eq!(portable.extension(vertex), ".vertvshader");
        assert_eq!(portable.extension(fragment), ".pixelvshader");
        assert_eq!(native.extension(vertex), ".vertglshader");
        assert_eq!(native.extension(fragment), ".pixelglshader");
        assert_eq!(ArtifactKind::Descriptor.extension(vertex), ".vertdesc.json");
        assert_eq!(
            ArtifactKind::Descriptor.extension(fragment),
            ".pixeldesc.json"
        );
    }

    #[test]
    fn iteration_order_is_vertex_first() {
        let mut stages = vec![ShaderStage::Fragment, ShaderStage::Vertex];
        stages.sort();
        assert_eq!(stages, ShaderStage::ALL);
    }
}
