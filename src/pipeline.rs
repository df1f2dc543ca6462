//! The shader build pipeline: sources in, linked program out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::ArtifactCache;
use crate::compiler::{CompileRequest, OfflineCompiler};
use crate::config::PipelineConfig;
use crate::device::{compose_program, ShaderDevice};
use crate::error::{Result, ShaderError};
use crate::reflect;
use crate::source::{self, StageSourceMap};
use crate::stage::{ArtifactKind, ShaderStage, TargetEnv};

/// Reflection descriptor JSON per stage, as returned by
/// [`ShaderPipeline::init`].
pub type StageDescriptors = BTreeMap<ShaderStage, String>;

/// Lifecycle of a [`ShaderPipeline`]. States only ever advance; a failed
/// [`ShaderPipeline::init`] ends in [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    /// Nothing loaded yet.
    Unloaded,
    /// Per-stage sources are known and non-empty.
    SourcesLoaded,
    /// Portable and native binaries exist for every stage.
    BinariesReady,
    /// The program is linked.
    Composed,
    /// Descriptors exist; transient sources and binaries are gone.
    DescriptorsReady,
    /// Initialisation failed and everything was released. Terminal.
    Failed,
}

/// Builds one GPU program from GLSL sources, caching every intermediate
/// artifact on disk.
///
/// ```no_run
/// # use gl_shader_pipeline::{OfflineCompiler, PipelineConfig, ShaderDevice, ShaderPipeline};
/// # fn example<D: ShaderDevice>(
/// #     device: D,
/// #     compiler: Box<dyn OfflineCompiler>,
/// # ) -> gl_shader_pipeline::Result<()> {
/// let mut shader = ShaderPipeline::with_compiler(device, compiler, PipelineConfig::default());
/// shader.load_from_file("assets/shaders/basic.glsl")?;
/// shader.init()?;
///
/// shader.bind();
/// // draw
/// shader.unbind();
/// # Ok(())
/// # }
/// ```
///
/// The program is deleted when the pipeline is dropped.
pub struct ShaderPipeline<D: ShaderDevice> {
    device: D,
    compiler: Box<dyn OfflineCompiler>,
    cache: ArtifactCache,
    entry_point: String,
    optimize: bool,

    name: String,
    file_path: Option<PathBuf>,
    sources: StageSourceMap,
    program: Option<D::Program>,
    state: PipelineState,
}

impl<D: ShaderDevice> ShaderPipeline<D> {
    /// Create a pipeline that compiles with shaderc.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CompilerUnavailable`] if shaderc cannot be
    /// initialised.
    #[cfg(feature = "shaderc")]
    pub fn new(device: D, config: PipelineConfig) -> Result<Self> {
        let compiler = crate::compiler::ShadercCompiler::new()?;
        Ok(Self::with_compiler(device, Box::new(compiler), config))
    }

    /// Create a pipeline with a caller-supplied compiler.
    pub fn with_compiler(
        device: D,
        compiler: Box<dyn OfflineCompiler>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            device,
            compiler,
            cache: config.cache(),
            entry_point: config.entry_point,
            optimize: config.optimize,
            name: String::new(),
            file_path: None,
            sources: StageSourceMap::new(),
            program: None,
            state: PipelineState::Unloaded,
        }
    }

    /// Shader name; the cache key prefix of every artifact.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The linked program, once composed.
    #[must_use]
    pub fn program(&self) -> Option<D::Program> {
        self.program
    }

    /// The device the program lives on.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The artifact cache in use.
    #[must_use]
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    fn expect_state(&self, expected: PipelineState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ShaderError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Load sources from a combined shader definition file.
    ///
    /// The shader name is the file name without its last extension.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::SourceNotFound`] if the path is empty or does
    /// not exist, [`ShaderError::MissingStageMarker`] for content before the
    /// first marker, and [`ShaderError::MissingSource`] if any stage ends up
    /// empty.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.expect_state(PipelineState::Unloaded, "load")?;

        let path = path.as_ref();
        if path.as_os_str().is_empty() || !path.exists() {
            return Err(ShaderError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let sources = source::split_file(path)?;
        require_sources(&sources)?;

        self.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.file_path = Some(path.to_path_buf());
        self.sources = sources;
        self.state = PipelineState::SourcesLoaded;
        Ok(())
    }

    /// Load sources supplied in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::MissingSource`] if either source is empty and
    /// [`ShaderError::SourceNotFound`] if `name` is empty.
    pub fn from_source(&mut self, name: &str, vertex: &str, fragment: &str) -> Result<()> {
        self.expect_state(PipelineState::Unloaded, "load")?;

        if name.is_empty() {
            return Err(ShaderError::SourceNotFound {
                path: PathBuf::new(),
            });
        }

        let sources = StageSourceMap::from([
            (ShaderStage::Vertex, vertex.to_string()),
            (ShaderStage::Fragment, fragment.to_string()),
        ]);
        require_sources(&sources)?;

        self.name = name.to_string();
        self.sources = sources;
        self.state = PipelineState::SourcesLoaded;
        Ok(())
    }

    /// Compile (or fetch from cache) every binary, link the program, and
    /// produce the reflection descriptors.
    ///
    /// Sources and intermediate binaries are released afterwards; only the
    /// program and the name remain.
    ///
    /// # Errors
    ///
    /// Any compilation, cache, composition, or reflection failure. Nothing is
    /// retried: the pipeline releases its program and sources and moves to
    /// [`PipelineState::Failed`].
    pub fn init(&mut self) -> Result<StageDescriptors> {
        self.expect_state(PipelineState::SourcesLoaded, "initialise")?;

        let result = self.build();
        if result.is_err() {
            if let Some(program) = self.program.take() {
                self.device.delete_program(program);
            }
            self.sources.clear();
            self.state = PipelineState::Failed;
        }
        result
    }

    fn build(&mut self) -> Result<StageDescriptors> {
        self.cache.ensure_root()?;

        let portable = self.resolve_binaries(TargetEnv::PortableIr)?;
        let native = self.resolve_binaries(TargetEnv::NativeExecution)?;
        drop(portable);
        self.state = PipelineState::BinariesReady;

        let program = compose_program(&mut self.device, &native, &self.entry_point)?;
        drop(native);
        self.program = Some(program);
        self.state = PipelineState::Composed;

        let descriptors = self.resolve_descriptors()?;
        self.sources.clear();
        self.state = PipelineState::DescriptorsReady;

        Ok(descriptors)
    }

    /// Make the program current.
    pub fn bind(&mut self) {
        match self.program {
            Some(program) => self.device.use_program(Some(program)),
            None => log::warn!("Shader {} bound before it was initialised", self.name),
        }
    }

    /// Unbind whatever program is current.
    pub fn unbind(&mut self) {
        self.device.use_program(None);
    }

    fn input_file_name(&self) -> String {
        self.file_path
            .as_ref()
            .map_or_else(|| self.name.clone(), |path| path.display().to_string())
    }

    fn resolve_binaries(&mut self, target: TargetEnv) -> Result<BTreeMap<ShaderStage, Vec<u32>>> {
        let kind = ArtifactKind::Binary(target);
        let input_file_name = self.input_file_name();
        let mut binaries = BTreeMap::new();

        for (&stage, source) in &self.sources {
            let binary = if self.cache.has(&self.name, stage, kind) {
                log::debug!("Shader {} ({stage}, {target}) loaded from cache", self.name);
                self.cache.load_binary(&self.name, stage, kind)?
            } else {
                let binary = self.compiler.compile(&CompileRequest {
                    name: &self.name,
                    input_file_name: &input_file_name,
                    source,
                    stage,
                    target,
                    optimize: self.optimize,
                    entry_point: &self.entry_point,
                })?;
                self.cache.store_binary(&self.name, stage, kind, &binary)?;
                binary
            };
            binaries.insert(stage, binary);
        }

        Ok(binaries)
    }

    fn resolve_descriptors(&mut self) -> Result<StageDescriptors> {
        let input_file_name = self.input_file_name();
        let mut descriptors = StageDescriptors::new();

        for (&stage, source) in &self.sources {
            let json = if self.cache.has(&self.name, stage, ArtifactKind::Descriptor) {
                self.cache.load_descriptor(&self.name, stage)?
            } else {
                let binary = self.compiler.compile(&CompileRequest {
                    name: &self.name,
                    input_file_name: &input_file_name,
                    source,
                    stage,
                    target: TargetEnv::PortableIr,
                    optimize: false,
                    entry_point: &self.entry_point,
                })?;
                let json = reflect::reflect(&binary)?.to_json()?;
                self.cache.store_descriptor(&self.name, stage, &json)?;
                json
            };
            log::trace!("Shader::Reflect {} ({stage}): {json}", self.name);
            descriptors.insert(stage, json);
        }

        Ok(descriptors)
    }
}

impl<D: ShaderDevice> Drop for ShaderPipeline<D> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.device.delete_program(program);
        }
    }
}

/// Every stage must have non-empty source.
fn require_sources(sources: &StageSourceMap) -> Result<()> {
    for stage in ShaderStage::ALL {
        if sources.get(&stage).is_none_or(String::is_empty) {
            return Err(ShaderError::MissingSource { stage });
        }
    }
    Ok(())
}
