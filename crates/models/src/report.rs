use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one image assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub image_ref: String,
    pub context_digest: String,
    pub context_files: usize,
    pub context_bytes: u64,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn new(
        image_ref: String,
        context_digest: String,
        context_files: usize,
        context_bytes: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            image_ref,
            context_digest,
            context_files,
            context_bytes,
            duration_ms,
            finished_at: Utc::now(),
        }
    }
}

/// Summary of one container run. `exit_code` is the container's own;
/// nothing here reinterprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub container_id: String,
    pub image_ref: String,
    pub exit_code: i64,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(container_id: String, image_ref: String, exit_code: i64, duration_ms: u64) -> Self {
        Self {
            container_id,
            image_ref,
            exit_code,
            duration_ms,
            finished_at: Utc::now(),
        }
    }
}
