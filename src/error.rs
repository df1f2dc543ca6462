//! Error type shared by every stage of the shader build.
//!
//! Every failure is fatal for the shader being built: nothing in this crate
//! retries or degrades. The host decides whether to surface the error, fall
//! back to another shader, or abort.

use std::path::PathBuf;

use thiserror::Error;

use crate::stage::ShaderStage;

/// Convenience alias used by all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, ShaderError>;

/// Errors produced while splitting, compiling, caching, composing, or
/// reflecting a shader.
#[derive(Error, Debug)]
pub enum ShaderError {
    // ========================================================================
    // Source errors
    // ========================================================================
    /// A content line appeared before the first stage marker.
    #[error("Shader source has content before any stage marker (line {line}); check shader definitions")]
    MissingStageMarker {
        /// 1-based line number of the offending line.
        line: usize,
    },

    /// A required stage has no source text.
    #[error("There has to be a {stage} source")]
    MissingSource {
        /// The stage whose source is missing or empty.
        stage: ShaderStage,
    },

    /// The shader definition file is missing or no path was given.
    #[error("Cannot find shader file: {}", .path.display())]
    SourceNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// The shader definition file exists but could not be read.
    #[error("Cannot read shader file {}: {source}", .path.display())]
    SourceIo {
        /// The path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // Compilation errors
    // ========================================================================
    /// The offline compiler rejected a stage.
    #[error("Shader {{{name}}} failed to compile ({stage}): {log}")]
    CompilationFailed {
        /// Shader name.
        name: String,
        /// Stage being compiled.
        stage: ShaderStage,
        /// Full compiler diagnostic text.
        log: String,
    },

    /// The offline compiler could not be initialised.
    #[error("Shader compiler unavailable: {0}")]
    CompilerUnavailable(String),

    // ========================================================================
    // Device errors
    // ========================================================================
    /// A stage failed to load into the device.
    #[error("{stage} shader injection failed: {log}")]
    StageLinkFailed {
        /// The stage that failed.
        stage: ShaderStage,
        /// Device info log for the stage.
        log: String,
    },

    /// The program object failed to link.
    #[error("Program link failed: {log}")]
    ProgramLinkFailed {
        /// Device info log for the program.
        log: String,
    },

    /// The device could not create a shader or program object.
    #[error("Failed to create GPU object: {0}")]
    ObjectCreationFailed(String),

    /// The entry point name cannot be handed to the driver.
    #[error("Entry point {entry_point:?} contains a NUL byte")]
    InvalidEntryPoint {
        /// The rejected name.
        entry_point: String,
    },

    /// A native binary exceeds the driver's length limit.
    #[error("SPIR-V binary of {len} bytes is too large to upload")]
    BinaryTooLarge {
        /// Size of the binary in bytes.
        len: usize,
    },

    // ========================================================================
    // Cache errors
    // ========================================================================
    /// A cache file could not be opened, created, read, or written.
    #[error("Shader cache I/O failure at {}: {source}", .path.display())]
    CacheIo {
        /// Path of the artifact or cache directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A cached binary does not hold a whole number of 32-bit words.
    #[error("Corrupt shader cache artifact {} ({len} bytes is not a multiple of 4)", .path.display())]
    CorruptCacheArtifact {
        /// Path of the artifact.
        path: PathBuf,
        /// Size of the artifact in bytes.
        len: usize,
    },

    // ========================================================================
    // Reflection errors
    // ========================================================================
    /// The portable binary could not be reflected.
    #[error("Shader reflection failed: {reason}")]
    ReflectionFailed {
        /// Reflection library message.
        reason: String,
    },

    /// A descriptor could not be serialised to JSON.
    #[error("Reflection descriptor serialisation failed: {0}")]
    Descriptor(#[from] serde_json::Error),

    // ========================================================================
    // Lifecycle errors
    // ========================================================================
    /// An operation was invoked in a lifecycle state that does not allow it.
    #[error("Cannot {operation} a shader in state {state:?}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the pipeline was in.
        state: crate::pipeline::PipelineState,
    },
}

impl ShaderError {
    pub(crate) fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = ShaderError::MissingSource {
            stage: ShaderStage::Fragment,
        };
        assert_eq!(err.to_string(), "There has to be a fragment source");

        let err = ShaderError::CompilationFailed {
            name: "basic".into(),
            stage: ShaderStage::Vertex,
            log: "error: 'foo' undeclared".into(),
        };
        assert_eq!(
            err.to_string(),
            "Shader {basic} failed to compile (vertex): error: 'foo' undeclared"
        );
    }
}
