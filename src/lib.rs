//! A GLSL shader build pipeline for OpenGL, driven through [glow].
//!
//! This crate turns a combined shader definition file (or in-memory sources)
//! into a linked GPU program. Each stage is compiled offline to SPIR-V twice:
//! once for Vulkan, used only for reflection, and once for OpenGL, loaded
//! into the driver through `ARB_gl_spirv`. Every binary and every reflection
//! descriptor is cached on disk, so later runs skip the compiler entirely.
//!
//! # Overview
//!
//! - [`source`] splits `#vertexShader` / `#fragmentShader` files into stages.
//! - [`OfflineCompiler`] compiles one stage; [`ShadercCompiler`] is the
//!   default implementation.
//! - [`ArtifactCache`] stores binaries and descriptors under
//!   `cache/shaders/`.
//! - [`compose_program`] links native binaries on a [`ShaderDevice`];
//!   [`GlowDevice`] is the OpenGL implementation.
//! - [`reflect()`] describes a binary's resource bindings as JSON.
//! - [`ShaderPipeline`] runs all of the above in order.
//!
//! # Caching
//!
//! Cache entries are never invalidated. Editing a shader keeps the old
//! compiled output until the matching files under the cache root are
//! deleted.
//!
//! # Safety
//!
//! Creating a [`GlowDevice`] requires a valid, current OpenGL 4.6 (or
//! `ARB_gl_spirv`) context, which must stay current while the device and any
//! pipeline using it are alive.
//!
//! [glow]: https://docs.rs/glow

mod cache;
mod compiler;
mod config;
mod device;
mod error;
#[cfg(feature = "glow")]
mod gl;
mod pipeline;
mod reflect;
pub mod source;
mod stage;

pub use cache::{ArtifactCache, DEFAULT_CACHE_DIR};
#[cfg(feature = "shaderc")]
pub use compiler::ShadercCompiler;
pub use compiler::{CompileRequest, OfflineCompiler};
pub use config::PipelineConfig;
pub use device::{compose_program, ShaderDevice};
pub use error::{Result, ShaderError};
#[cfg(feature = "glow")]
pub use gl::GlowDevice;
pub use pipeline::{PipelineState, ShaderPipeline, StageDescriptors};
pub use reflect::{
    reflect, EntryPoint, InterfaceVariable, PushConstantRange, ReflectionDescriptor,
    ResourceBinding, ResourceKind,
};
pub use source::StageSourceMap;
pub use stage::{ArtifactKind, ShaderStage, TargetEnv};
