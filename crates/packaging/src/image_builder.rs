use std::process::Stdio;

use skiff_models::{Recipe, SkiffError};
use tokio::process::Command;
use tracing::{error, info, instrument};

use crate::context::StagedContext;

/// Image reference an assembled recipe is tagged with. The tag embeds the
/// context digest, so an unchanged recipe + payload maps to the same image.
pub fn image_ref_for(recipe: &Recipe, context_digest: &str) -> String {
    let short = &context_digest[..context_digest.len().min(12)];
    format!("skiff/{}:{}", recipe.name, short)
}

pub struct ImageBuilder {
    _docker_host: String,
}

impl ImageBuilder {
    pub fn new(docker_host: String) -> Self {
        Self {
            _docker_host: docker_host,
        }
    }

    #[instrument(skip(self, recipe, staged), fields(recipe_name = %recipe.name))]
    pub async fn build_image(
        &self,
        recipe: &Recipe,
        staged: &StagedContext,
        image_ref: &str,
    ) -> Result<(), SkiffError> {
        let build_file = staged.build_file();

        info!("Building image: {}", image_ref);
        info!("Build context: {:?}", staged.path());
        info!("Build file: {:?}", build_file);

        let build_result = Command::new("docker")
            .arg("build")
            .arg("-t")
            .arg(image_ref)
            .arg("-f")
            .arg(&build_file)
            .arg(staged.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SkiffError::DockerError {
                message: e.to_string(),
            })?;

        if !build_result.status.success() {
            let stdout = String::from_utf8_lossy(&build_result.stdout);
            let stderr = String::from_utf8_lossy(&build_result.stderr);
            error!("Image build failed - stdout: {}", stdout);
            error!("Image build failed - stderr: {}", stderr);
            return Err(SkiffError::DockerError {
                message: format!("docker build failed: {stderr}"),
            });
        }

        info!("Built image: {}", image_ref);
        Ok(())
    }
}
