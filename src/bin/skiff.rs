use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use skiff_invoker::{create_spec, launch_and_wait, Launcher, RunOptions};
use skiff_models::{parse_env_pair, BuildReport, Config, Recipe, RunReport, SkiffError};
use skiff_packaging::{image_ref_for, plan, render, ContextStager, ImageBuilder, StagedContext};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Declarative container image assembly and launch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tool configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered build file for a recipe
    Render {
        /// Recipe file
        #[arg(long, default_value = "skiff.toml")]
        recipe: PathBuf,
    },
    /// Print the ordered build plan for a recipe
    Steps {
        /// Recipe file
        #[arg(long, default_value = "skiff.toml")]
        recipe: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble an image from a recipe and a build context
    Build {
        /// Recipe file
        #[arg(long, default_value = "skiff.toml")]
        recipe: PathBuf,
        /// Build context directory
        #[arg(long, default_value = ".")]
        context: PathBuf,
        /// Image reference to tag instead of the derived one
        #[arg(long)]
        tag: Option<String>,
        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble an image and run a container from it to completion
    Run {
        /// Recipe file
        #[arg(long, default_value = "skiff.toml")]
        recipe: PathBuf,
        /// Build context directory
        #[arg(long, default_value = ".")]
        context: PathBuf,
        /// Image reference to tag instead of the derived one
        #[arg(long)]
        tag: Option<String>,
        /// Environment override, KEY=VALUE; wins over recipe defaults
        #[arg(long = "env")]
        env: Vec<String>,
        /// Keep the container after it exits
        #[arg(long)]
        keep: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Check if Docker is running and accessible
async fn is_docker_running() -> bool {
    match tokio::process::Command::new("docker")
        .args(["version", "--format", "{{.Server.Version}}"])
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!(error_type = %e.error_type(), "{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn execute(cli: Cli) -> Result<i32, SkiffError> {
    let config = Config::load(&cli.config).unwrap_or_else(|_| {
        info!("Using default configuration (config file not found)");
        Config::default()
    });

    match cli.command {
        Commands::Render { recipe } => {
            let recipe = Recipe::load(&recipe)?;
            print!("{}", render(&recipe)?);
            Ok(0)
        }
        Commands::Steps { recipe, json } => {
            let recipe = Recipe::load(&recipe)?;
            let steps = plan(&recipe)?;
            if json {
                let rendered =
                    serde_json::to_string_pretty(&steps).map_err(|e| SkiffError::InternalError {
                        reason: e.to_string(),
                    })?;
                println!("{rendered}");
            } else {
                for (index, step) in steps.iter().enumerate() {
                    println!("{:>2}. {}", index + 1, step);
                }
            }
            Ok(0)
        }
        Commands::Build {
            recipe,
            context,
            tag,
            json,
        } => {
            let recipe = Recipe::load(&recipe)?;
            preflight().await?;

            let (report, _staged) = assemble(&config, &recipe, &context, tag).await?;
            if json {
                print_json(&report)?;
            } else {
                info!(
                    image_ref = %report.image_ref,
                    files = report.context_files,
                    bytes = report.context_bytes,
                    duration_ms = report.duration_ms,
                    "Image assembled"
                );
                println!("{}", report.image_ref);
            }
            Ok(0)
        }
        Commands::Run {
            recipe,
            context,
            tag,
            env,
            keep,
            json,
        } => {
            let recipe = Recipe::load(&recipe)?;
            let mut overrides = BTreeMap::new();
            for pair in &env {
                let (key, value) = parse_env_pair(pair)?;
                overrides.insert(key, value);
            }
            preflight().await?;

            let (report, _staged) = assemble(&config, &recipe, &context, tag).await?;

            let launcher = Launcher::new().await?;
            let spec = create_spec(&recipe, &report.image_ref, &overrides);
            let opts = RunOptions {
                wait_timeout_ms: config.run.wait_timeout_ms,
                stop_grace_secs: config.run.stop_grace_secs,
                remove_after_exit: config.run.remove_after_exit && !keep,
            };

            let started = Instant::now();
            let outcome = launch_and_wait(&launcher, spec, &opts).await?;
            let run_report = RunReport::new(
                outcome.container_id.clone(),
                report.image_ref.clone(),
                outcome.exit_code,
                started.elapsed().as_millis() as u64,
            );

            print!("{}", outcome.logs);
            let _ = std::io::Write::flush(&mut std::io::stdout());
            if json {
                print_json(&run_report)?;
            } else if outcome.exit_code != 0 {
                warn!(
                    container_id = %run_report.container_id,
                    exit_code = run_report.exit_code,
                    "Container exited with a non-zero status"
                );
            }

            Ok(outcome.exit_code as i32)
        }
    }
}

async fn preflight() -> Result<(), SkiffError> {
    if !is_docker_running().await {
        error!("Docker is not running or not accessible");
        return Err(SkiffError::DockerError {
            message: "docker daemon unavailable".to_string(),
        });
    }
    Ok(())
}

async fn assemble(
    config: &Config,
    recipe: &Recipe,
    context: &PathBuf,
    tag: Option<String>,
) -> Result<(BuildReport, StagedContext), SkiffError> {
    let started = Instant::now();

    let stager = ContextStager::new(config.max_context_bytes());
    let staged = stager.stage(context, recipe)?;

    let image_ref = tag.unwrap_or_else(|| image_ref_for(recipe, &staged.digest));

    let builder = ImageBuilder::new(config.docker.host.clone());
    builder.build_image(recipe, &staged, &image_ref).await?;

    let report = BuildReport::new(
        image_ref,
        staged.digest.clone(),
        staged.files.len(),
        staged.total_size,
        started.elapsed().as_millis() as u64,
    );
    Ok((report, staged))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), SkiffError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| SkiffError::InternalError {
        reason: e.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}
