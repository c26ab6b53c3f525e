#![cfg(feature = "docker_tests")]

use std::collections::BTreeMap;

use skiff_invoker::{create_spec, launch_and_wait, Launcher, RunOptions};
use skiff_models::{Config, Recipe};
use skiff_packaging::{image_ref_for, ContextStager, ImageBuilder};

fn bot_recipe() -> Recipe {
    let mut recipe = Recipe::default();
    recipe.name = "skiff-e2e".to_string();
    recipe
}

fn run_opts(config: &Config) -> RunOptions {
    RunOptions {
        wait_timeout_ms: config.run.wait_timeout_ms,
        stop_grace_secs: config.run.stop_grace_secs,
        remove_after_exit: true,
    }
}

async fn build(recipe: &Recipe, context: &std::path::Path) -> anyhow::Result<String> {
    let config = Config::default();
    let staged = ContextStager::new(config.max_context_bytes()).stage(context, recipe)?;
    let image_ref = image_ref_for(recipe, &staged.digest);
    ImageBuilder::new(config.docker.host.clone())
        .build_image(recipe, &staged, &image_ref)
        .await?;
    Ok(image_ref)
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn build_and_run_reports_the_default_environment() -> anyhow::Result<()> {
    let context = tempfile::tempdir()?;
    std::fs::write(
        context.path().join("main.py"),
        "import os\nprint(os.environ.get(\"NAME\"))\n",
    )?;

    let recipe = bot_recipe();
    let image_ref = build(&recipe, context.path()).await?;

    let config = Config::default();
    let launcher = Launcher::new().await?;

    // Default environment.
    let spec = create_spec(&recipe, &image_ref, &BTreeMap::new());
    let outcome = launch_and_wait(&launcher, spec, &run_opts(&config)).await?;
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.logs.contains("Bot"));

    // Override wins.
    let overrides = BTreeMap::from([("NAME".to_string(), "Other".to_string())]);
    let spec = create_spec(&recipe, &image_ref, &overrides);
    let outcome = launch_and_wait(&launcher, spec, &run_opts(&config)).await?;
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.logs.contains("Other"));

    Ok(())
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn missing_entry_point_fails_at_container_start() -> anyhow::Result<()> {
    let context = tempfile::tempdir()?;
    std::fs::write(context.path().join("README.txt"), "no entry point here\n")?;

    let recipe = bot_recipe();
    // The image still assembles; the copy is verbatim and unvalidated.
    let image_ref = build(&recipe, context.path()).await?;

    let config = Config::default();
    let launcher = Launcher::new().await?;
    let spec = create_spec(&recipe, &image_ref, &BTreeMap::new());
    let outcome = launch_and_wait(&launcher, spec, &run_opts(&config)).await?;

    assert_ne!(outcome.exit_code, 0);
    Ok(())
}
