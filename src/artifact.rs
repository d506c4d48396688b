//! Compiled artifacts

use std::fmt;

/// The compiled, cacheable result of translating a template source.
///
/// Immutable after creation. The template function itself lives in the
/// engine's evaluator registry; `callable` is the handle used to fetch it for
/// each execution. `source_lines` is retained so diagnostics can quote the
/// original template without re-reading the file.
pub struct CompiledArtifact {
    pub key: String,
    pub filename: String,
    pub generated_source: String,
    pub source_lines: Vec<String>,
    pub(crate) callable: mlua::RegistryKey,
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledArtifact")
            .field("key", &self.key)
            .field("filename", &self.filename)
            .field("lines", &self.source_lines.len())
            .finish()
    }
}
