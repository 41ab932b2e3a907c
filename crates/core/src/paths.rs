//! Staging and final location derivation.
//!
//! All locations are storage keys relative to the storage root. Client
//! supplied file names only ever reach a key through [`sanitize_file_name`],
//! so no name can escape the files area or collide with the staging layout.

use crate::upload::UploadId;

/// Prefix of every staged chunk object inside an upload's staging directory.
pub const CHUNK_PREFIX: &str = "chunk_";

/// Suffix of the in-flight merge target.
pub const PART_SUFFIX: &str = ".part";

/// Longest sanitized file name kept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 200;

/// Name used when nothing usable survives sanitization.
pub const FALLBACK_FILE_NAME: &str = "file";

const UNSAFE_SEQUENCES: &[&str] = &["..", "/", "\\", ":", "*", "?", "\"", "<", ">", "|"];

/// Reduce a client supplied file name to a single safe path segment.
///
/// Only the last path segment is kept, separators and reserved characters
/// become `_`, and empty or dot-only results fall back to `file`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut safe = base.to_string();
    for seq in UNSAFE_SEQUENCES {
        safe = safe.replace(seq, "_");
    }
    let mut safe: String = safe
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    if safe.len() > MAX_FILE_NAME_LEN {
        let mut cut = MAX_FILE_NAME_LEN;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        safe.truncate(cut);
    }

    if safe.is_empty() || safe == "." || safe == "_" {
        return FALLBACK_FILE_NAME.to_string();
    }
    safe
}

/// Parse a staged chunk object name (`chunk_<index>`) into its index.
///
/// Returns `None` for anything else, including in-flight temporary files
/// left next to the chunks by atomic writes.
pub fn parse_chunk_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The three locations involved in one upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPaths {
    /// Directory holding the staged chunks.
    pub staging_dir: String,
    /// Location of the completed artifact.
    pub final_path: String,
    /// Merge target, renamed onto `final_path` once fully written.
    pub staging_final_path: String,
}

/// Derives storage keys for uploads from configured area names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathResolver {
    staging_dir: String,
    files_dir: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self {
            staging_dir: "tmp".to_string(),
            files_dir: "files".to_string(),
        }
    }
}

impl PathResolver {
    /// Create a resolver for the given staging and files areas.
    ///
    /// Both must be single, plain path segments and must differ.
    pub fn new(staging_dir: impl Into<String>, files_dir: impl Into<String>) -> Result<Self, String> {
        let staging_dir = staging_dir.into();
        let files_dir = files_dir.into();
        validate_area("staging_dir", &staging_dir)?;
        validate_area("files_dir", &files_dir)?;
        if staging_dir == files_dir {
            return Err("staging_dir and files_dir must differ".to_string());
        }
        Ok(Self {
            staging_dir,
            files_dir,
        })
    }

    /// Derive all locations for an upload.
    pub fn paths(&self, upload_id: &UploadId, file_name: &str) -> UploadPaths {
        let final_path = format!(
            "{}/{}_{}",
            self.files_dir,
            upload_id,
            sanitize_file_name(file_name)
        );
        UploadPaths {
            staging_dir: self.staging_prefix(upload_id),
            staging_final_path: format!("{final_path}{PART_SUFFIX}"),
            final_path,
        }
    }

    /// Staging directory of an upload.
    pub fn staging_prefix(&self, upload_id: &UploadId) -> String {
        format!("{}/{}", self.staging_dir, upload_id)
    }

    /// Key of one staged chunk.
    pub fn chunk_key(&self, upload_id: &UploadId, index: u64) -> String {
        format!("{}/{}{}", self.staging_prefix(upload_id), CHUNK_PREFIX, index)
    }

    /// Extract the chunk index from a key listed under the upload's staging
    /// directory. Nested or foreign keys yield `None`.
    pub fn chunk_index_of(&self, upload_id: &UploadId, key: &str) -> Option<u64> {
        let prefix = self.staging_prefix(upload_id);
        let name = key.strip_prefix(&prefix)?.strip_prefix('/')?;
        if name.contains('/') {
            return None;
        }
        parse_chunk_name(name)
    }
}

fn validate_area(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value == "." || value.contains("..") || value.contains(['/', '\\']) {
        return Err(format!("{field} must be a single plain path segment: {value:?}"));
    }
    Ok(())
}
