//! Offline GLSL to SPIR-V compilation.
//!
//! The pipeline talks to the compiler through [`OfflineCompiler`] so that a
//! host (or a test) can substitute its own implementation. The default one,
//! [`ShadercCompiler`], wraps shaderc.

use crate::error::Result;
#[cfg(feature = "shaderc")]
use crate::error::ShaderError;
use crate::stage::{ShaderStage, TargetEnv};

/// Everything needed to compile one stage for one target.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Shader name, reported in diagnostics.
    pub name: &'a str,
    /// File name handed to the compiler for its own diagnostics.
    pub input_file_name: &'a str,
    /// GLSL source of the stage.
    pub source: &'a str,
    /// Stage being compiled.
    pub stage: ShaderStage,
    /// Target environment of the produced binary.
    pub target: TargetEnv,
    /// `true` for maximum optimisation, `false` for none.
    pub optimize: bool,
    /// Name of the entry point function.
    pub entry_point: &'a str,
}

/// Compiles one stage of GLSL into SPIR-V words.
pub trait OfflineCompiler {
    /// Compile `request.source`.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CompilationFailed`](crate::ShaderError::CompilationFailed)
    /// carrying the full diagnostic text when the source does not compile.
    fn compile(&mut self, request: &CompileRequest<'_>) -> Result<Vec<u32>>;
}

/// [`OfflineCompiler`] backed by shaderc.
///
/// The portable target is Vulkan 1.2; the native target is OpenGL 4.5.
#[cfg(feature = "shaderc")]
pub struct ShadercCompiler {
    compiler: shaderc::Compiler,
}

#[cfg(feature = "shaderc")]
impl ShadercCompiler {
    /// Create a compiler instance.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CompilerUnavailable`] if shaderc cannot be
    /// initialised.
    pub fn new() -> Result<Self> {
        let compiler = shaderc::Compiler::new().ok_or_else(|| {
            ShaderError::CompilerUnavailable("Failed to create shader compiler".to_string())
        })?;

        Ok(Self { compiler })
    }
}

#[cfg(feature = "shaderc")]
impl OfflineCompiler for ShadercCompiler {
    fn compile(&mut self, request: &CompileRequest<'_>) -> Result<Vec<u32>> {
        let mut options = shaderc::CompileOptions::new().ok_or_else(|| {
            ShaderError::CompilerUnavailable("Failed to create compile options".to_string())
        })?;

        let (env, version) = match request.target {
            TargetEnv::PortableIr => (
                shaderc::TargetEnv::Vulkan,
                shaderc::EnvVersion::Vulkan1_2 as u32,
            ),
            TargetEnv::NativeExecution => (
                shaderc::TargetEnv::OpenGL,
                shaderc::EnvVersion::OpenGL4_5 as u32,
            ),
        };
        options.set_target_env(env, version);
        options.set_optimization_level(if request.optimize {
            shaderc::OptimizationLevel::Performance
        } else {
            shaderc::OptimizationLevel::Zero
        });

        let kind = match request.stage {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        };

        log::debug!(
            "Compiling {} {} shader for {} (optimize: {})",
            request.name,
            request.stage,
            request.target,
            request.optimize
        );

        let artifact = self
            .compiler
            .compile_into_spirv(
                request.source,
                kind,
                request.input_file_name,
                request.entry_point,
                Some(&options),
            )
            .map_err(|e| ShaderError::CompilationFailed {
                name: request.name.to_string(),
                stage: request.stage,
                log: e.to_string(),
            })?;

        if artifact.get_num_warnings() > 0 {
            log::warn!(
                "Shader {} ({}) compilation warnings: {}",
                request.name,
                request.stage,
                artifact.get_warning_messages()
            );
        }

        Ok(artifact.as_binary().to_vec())
    }
}

#[cfg(all(test, feature = "shaderc"))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VERTEX: &str = "#version 450
layout(location = 0) in vec3 a_position;
void main() {
    gl_Position = vec4(a_position, 1.0);
}
";

    fn request(source: &str, target: TargetEnv, optimize: bool) -> CompileRequest<'_> {
        CompileRequest {
            name: "test",
            input_file_name: "test.glsl",
            source,
            stage: ShaderStage::Vertex,
            target,
            optimize,
            entry_point: "main",
        }
    }

    #[test]
    fn compiles_for_both_targets() {
        let mut compiler = ShadercCompiler::new().unwrap();
        for target in [TargetEnv::PortableIr, TargetEnv::NativeExecution] {
            for optimize in [false, true] {
                let words = compiler.compile(&request(VERTEX, target, optimize)).unwrap();
                // SPIR-V magic number.
                assert_eq!(words[0], 0x0723_0203);
            }
        }
    }

    #[test]
    fn failure_reports_name_stage_and_log() {
        let mut compiler = ShadercCompiler::new().unwrap();
        let source = "#version 450\nvoid main() { undeclared_thing = 1; }\n";
        let err = compiler
            .compile(&request(source, TargetEnv::PortableIr, true))
            .unwrap_err();
        match err {
            ShaderError::CompilationFailed { name, stage, log } => {
                assert_eq!(name, "test");
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(log.contains("undeclared_thing"), "{log}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
