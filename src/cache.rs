//! On-disk cache of compiled binaries and reflection descriptors.
//!
//! One file per `{shader name, stage, artifact kind}` under a single root
//! directory. Entries never expire: a changed shader source keeps using the
//! cached output until the file is deleted.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, ShaderError};
use crate::stage::{ArtifactKind, ShaderStage};

/// Default cache root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cache/shaders";

/// Gateway to the artifact files under one cache root.
///
/// Holds no state besides the root path. Concurrent writers to the same key
/// are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl ArtifactCache {
    /// Create a cache rooted at `root`. Nothing is touched on disk until
    /// [`ensure_root`](Self::ensure_root) or [`store`](Self::store).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an artifact.
    #[must_use]
    pub fn path(&self, name: &str, stage: ShaderStage, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("{name}{}", kind.extension(stage)))
    }

    /// Create the root directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CacheIo`] if the directory cannot be created.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| ShaderError::cache_io(&self.root, e))
    }

    /// Whether an artifact exists. Zero-byte files count as absent; they are
    /// what a crash in the middle of a write leaves behind.
    #[must_use]
    pub fn has(&self, name: &str, stage: ShaderStage, kind: ArtifactKind) -> bool {
        fs::metadata(self.path(name, stage, kind)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Read an artifact's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CacheIo`] if the file cannot be opened or read.
    pub fn load(&self, name: &str, stage: ShaderStage, kind: ArtifactKind) -> Result<Vec<u8>> {
        let path = self.path(name, stage, kind);
        fs::read(&path).map_err(|e| ShaderError::cache_io(path, e))
    }

    /// Write an artifact, creating the root directory first if needed. The
    /// file is flushed and synced before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CacheIo`] if the directory or file cannot be
    /// created or written.
    pub fn store(
        &self,
        name: &str,
        stage: ShaderStage,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<()> {
        self.ensure_root()?;

        let path = self.path(name, stage, kind);
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = File::create(path)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()
        };
        write(&path).map_err(|e| ShaderError::cache_io(path, e))
    }

    /// Read a cached SPIR-V binary.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CacheIo`] on I/O failure and
    /// [`ShaderError::CorruptCacheArtifact`] if the file size is not a whole
    /// number of words.
    pub fn load_binary(
        &self,
        name: &str,
        stage: ShaderStage,
        kind: ArtifactKind,
    ) -> Result<Vec<u32>> {
        let path = self.path(name, stage, kind);
        let read = |path: &Path| -> std::io::Result<(Vec<u32>, usize)> {
            let mut file = File::open(path)?;
            let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
            if len % 4 != 0 {
                return Ok((Vec::new(), len));
            }
            let mut words = vec![0u32; len / 4];
            file.read_exact(bytemuck::cast_slice_mut(&mut words))?;
            Ok((words, len))
        };

        let (words, len) = read(&path).map_err(|e| ShaderError::cache_io(&path, e))?;
        if len % 4 != 0 {
            return Err(ShaderError::CorruptCacheArtifact { path, len });
        }
        Ok(words)
    }

    /// Write a SPIR-V binary, byte for byte.
    ///
    /// # Errors
    ///
    /// See [`store`](Self::store).
    pub fn store_binary(
        &self,
        name: &str,
        stage: ShaderStage,
        kind: ArtifactKind,
        words: &[u32],
    ) -> Result<()> {
        self.store(name, stage, kind, bytemuck::cast_slice(words))
    }

    /// Read a cached reflection descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::CacheIo`] if the file cannot be read or is not
    /// valid UTF-8.
    pub fn load_descriptor(&self, name: &str, stage: ShaderStage) -> Result<String> {
        let path = self.path(name, stage, ArtifactKind::Descriptor);
        fs::read_to_string(&path).map_err(|e| ShaderError::cache_io(path, e))
    }

    /// Write a reflection descriptor.
    ///
    /// # Errors
    ///
    /// See [`store`](Self::store).
    pub fn store_descriptor(&self, name: &str, stage: ShaderStage, json: &str) -> Result<()> {
        self.store(name, stage, ArtifactKind::Descriptor, json.as_bytes())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::stage::TargetEnv;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A fresh, empty directory under the system temp dir.
    pub(crate) fn scratch_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "gl-shader-pipeline-{label}-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    const NATIVE: ArtifactKind = ArtifactKind::Binary(TargetEnv::NativeExecution);

    #[test]
    fn layout_is_name_plus_extension() {
        let cache = ArtifactCache::new("cache/shaders");
        assert_eq!(
            cache.path("basic", ShaderStage::Fragment, NATIVE),
            Path::new("cache/shaders/basic.pixelglshader")
        );
        assert_eq!(
            cache.path("basic", ShaderStage::Vertex, ArtifactKind::Descriptor),
            Path::new("cache/shaders/basic.vertdesc.json")
        );
    }

    #[test]
    fn store_creates_root_and_round_trips() {
        let root = scratch_dir("roundtrip").join("nested");
        let cache = ArtifactCache::new(&root);
        let words = vec![0x0723_0203, 0x0001_0500, 0xdead_beef, 7];

        assert!(!cache.has("basic", ShaderStage::Vertex, NATIVE));
        cache
            .store_binary("basic", ShaderStage::Vertex, NATIVE, &words)
            .unwrap();

        assert!(root.is_dir());
        assert!(cache.has("basic", ShaderStage::Vertex, NATIVE));
        assert_eq!(
            cache.load_binary("basic", ShaderStage::Vertex, NATIVE).unwrap(),
            words
        );
        assert_eq!(
            cache.load("basic", ShaderStage::Vertex, NATIVE).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&words)
        );
    }

    #[test]
    fn zero_byte_file_is_absent() {
        let cache = ArtifactCache::new(scratch_dir("empty"));
        cache.ensure_root().unwrap();
        File::create(cache.path("basic", ShaderStage::Fragment, NATIVE)).unwrap();

        assert!(!cache.has("basic", ShaderStage::Fragment, NATIVE));
    }

    #[test]
    fn artifacts_are_keyed_independently() {
        let cache = ArtifactCache::new(scratch_dir("keys"));
        cache
            .store_binary("basic", ShaderStage::Vertex, NATIVE, &[1])
            .unwrap();

        assert!(!cache.has("basic", ShaderStage::Fragment, NATIVE));
        assert!(!cache.has(
            "basic",
            ShaderStage::Vertex,
            ArtifactKind::Binary(TargetEnv::PortableIr)
        ));
        assert!(!cache.has("other", ShaderStage::Vertex, NATIVE));
    }

    #[test]
    fn descriptor_round_trips() {
        let cache = ArtifactCache::new(scratch_dir("desc"));
        cache
            .store_descriptor("basic", ShaderStage::Fragment, "{\"bindings\":[]}")
            .unwrap();
        assert_eq!(
            cache.load_descriptor("basic", ShaderStage::Fragment).unwrap(),
            "{\"bindings\":[]}"
        );
    }

    #[test]
    fn misaligned_binary_is_corrupt() {
        let cache = ArtifactCache::new(scratch_dir("corrupt"));
        cache
            .store("basic", ShaderStage::Vertex, NATIVE, &[1, 2, 3])
            .unwrap();
        let err = cache
            .load_binary("basic", ShaderStage::Vertex, NATIVE)
            .unwrap_err();
        assert!(matches!(err, ShaderError::CorruptCacheArtifact { len: 3, .. }));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let cache = ArtifactCache::new(scratch_dir("missing"));
        let err = cache
            .load_binary("basic", ShaderStage::Vertex, NATIVE)
            .unwrap_err();
        assert!(matches!(err, ShaderError::CacheIo { .. }));
    }
}
