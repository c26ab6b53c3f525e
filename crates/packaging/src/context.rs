use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use skiff_models::{Recipe, SkiffError};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::dockerfile;

/// Name of the rendered build file inside the staged context. Kept off
/// `Dockerfile` so a payload carrying its own is copied verbatim.
pub const BUILD_FILE_NAME: &str = "Dockerfile.skiff";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StagedFileInfo {
    pub name: String,
    pub size: u64,
}

/// A build context staged into a temporary directory: the payload copied
/// verbatim plus the rendered build file. Dropping it removes the directory.
pub struct StagedContext {
    dir: TempDir,
    pub digest: String,
    pub total_size: u64,
    pub files: Vec<StagedFileInfo>,
}

impl StagedContext {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn build_file(&self) -> PathBuf {
        self.dir.path().join(BUILD_FILE_NAME)
    }
}

pub struct ContextStager {
    max_context_bytes: u64,
}

impl ContextStager {
    pub fn new(max_context_bytes: u64) -> Self {
        Self { max_context_bytes }
    }

    /// Copy the build context verbatim into a fresh temporary directory and
    /// write the rendered build file next to it. The digest covers payload
    /// paths and contents (sorted walk) plus the rendered build file, so any
    /// change to either yields a new digest.
    pub fn stage(&self, context_dir: &Path, recipe: &Recipe) -> Result<StagedContext, SkiffError> {
        if !context_dir.is_dir() {
            return Err(SkiffError::ContextUnreadable {
                path: context_dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let rendered = dockerfile::render(recipe)?;

        let temp_dir = tempfile::tempdir().map_err(|e| SkiffError::InternalError {
            reason: e.to_string(),
        })?;

        let mut relative_paths = Vec::new();
        collect_files(context_dir, Path::new(""), &mut relative_paths)?;
        relative_paths.sort();

        let mut hasher = Sha256::new();
        let mut files = Vec::new();
        let mut total_size: u64 = 0;

        for rel in &relative_paths {
            let source = context_dir.join(rel);
            let data = std::fs::read(&source).map_err(|e| SkiffError::ContextUnreadable {
                path: source.display().to_string(),
                reason: e.to_string(),
            })?;

            total_size += data.len() as u64;
            if total_size > self.max_context_bytes {
                return Err(SkiffError::ContextTooLarge {
                    size: total_size,
                    max_size: self.max_context_bytes,
                });
            }

            let name = rel.to_string_lossy().replace('\\', "/");
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(&data);
            hasher.update([0u8]);

            let dest = temp_dir.path().join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SkiffError::InternalError {
                    reason: e.to_string(),
                })?;
            }
            std::fs::write(&dest, &data).map_err(|e| SkiffError::InternalError {
                reason: e.to_string(),
            })?;

            // Preserve the payload's permission bits (exec bits in particular).
            #[cfg(unix)]
            {
                let metadata =
                    std::fs::metadata(&source).map_err(|e| SkiffError::ContextUnreadable {
                        path: source.display().to_string(),
                        reason: e.to_string(),
                    })?;
                std::fs::set_permissions(&dest, metadata.permissions()).map_err(|e| {
                    SkiffError::InternalError {
                        reason: e.to_string(),
                    }
                })?;
            }

            files.push(StagedFileInfo {
                name,
                size: data.len() as u64,
            });
        }

        hasher.update(BUILD_FILE_NAME.as_bytes());
        hasher.update([0u8]);
        hasher.update(rendered.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        std::fs::write(temp_dir.path().join(BUILD_FILE_NAME), &rendered).map_err(|e| {
            SkiffError::InternalError {
                reason: e.to_string(),
            }
        })?;

        if let Some(entry) = recipe.entry_file() {
            if !temp_dir.path().join(entry).is_file() {
                warn!(
                    entry = %entry,
                    "startup command names a file the build context does not contain; \
                     container start will fail"
                );
            }
        }

        info!(
            "Staged build context: {} files, {} bytes, digest {}",
            files.len(),
            total_size,
            digest
        );

        Ok(StagedContext {
            dir: temp_dir,
            digest,
            total_size,
            files,
        })
    }
}

fn collect_files(
    root: &Path,
    relative: &Path,
    out: &mut Vec<PathBuf>,
) -> Result<(), SkiffError> {
    let dir = root.join(relative);
    let entries = std::fs::read_dir(&dir).map_err(|e| SkiffError::ContextUnreadable {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| SkiffError::ContextUnreadable {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let rel = relative.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| SkiffError::ContextUnreadable {
            path: entry.path().display().to_string(),
            reason: e.to_string(),
        })?;
        if file_type.is_dir() {
            collect_files(root, &rel, out)?;
        } else if file_type.is_file() {
            out.push(rel);
        } else {
            warn!(path = %entry.path().display(), "skipping non-regular file in build context");
        }
    }
    Ok(())
}
