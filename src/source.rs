//! Splitting of combined shader definition files into per-stage sources.
//!
//! A definition file holds every stage of one shader, each introduced by a
//! marker line:
//!
//! ```text
//! #vertexShader
//! #version 450
//! ...
//! #fragmentShader
//! #version 450
//! ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, ShaderError};
use crate::stage::ShaderStage;

/// Raw source text per stage, iterated in stage order.
pub type StageSourceMap = BTreeMap<ShaderStage, String>;

/// Read and split a shader definition file.
///
/// # Errors
///
/// Returns [`ShaderError::SourceIo`] if the file cannot be read and
/// [`ShaderError::MissingStageMarker`] if content precedes the first marker.
pub fn split_file(path: &Path) -> Result<StageSourceMap> {
    let text = std::fs::read_to_string(path).map_err(|source| ShaderError::SourceIo {
        path: path.to_path_buf(),
        source,
    })?;
    split_str(&text)
}

/// Split shader definition text into per-stage sources.
///
/// Marker lines are dropped. Every other line is appended, newline restored,
/// to the stage selected by the most recent marker. Text without any marker
/// yields an empty map; the pipeline rejects that later.
///
/// # Errors
///
/// Returns [`ShaderError::MissingStageMarker`] if any line precedes the first
/// marker. No partial map is returned in that case.
pub fn split_str(text: &str) -> Result<StageSourceMap> {
    let mut sources = StageSourceMap::new();
    let mut current = None;

    for (index, line) in text.lines().enumerate() {
        if let Some(stage) = ShaderStage::from_marker(line) {
            current = Some(stage);
            continue;
        }

        let stage = current.ok_or(ShaderError::MissingStageMarker { line: index + 1 })?;
        let source = sources.entry(stage).or_default();
        source.push_str(line);
        source.push('\n');
    }

    Ok(sources)
}
