use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use skiff_models::{ImageRef, Recipe, SkiffError};

/// One build directive. A recipe compiles to an ordered list of these;
/// rendering is a pure function of the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BuildStep {
    From { image: ImageRef },
    Workdir { dir: PathBuf },
    Copy { source: String, dest: String },
    Expose { port: u16 },
    Env { key: String, value: String },
    Cmd { argv: Vec<String> },
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::From { image } => write!(f, "FROM {image}"),
            BuildStep::Workdir { dir } => write!(f, "WORKDIR {}", dir.display()),
            BuildStep::Copy { source, dest } => write!(f, "COPY {source} {dest}"),
            BuildStep::Expose { port } => write!(f, "EXPOSE {port}"),
            BuildStep::Env { key, value } => {
                if value.is_empty() || value.chars().any(char::is_whitespace) {
                    write!(f, "ENV {key}=\"{}\"", escape(value))
                } else {
                    write!(f, "ENV {key}={value}")
                }
            }
            BuildStep::Cmd { argv } => {
                let args: Vec<String> =
                    argv.iter().map(|a| format!("\"{}\"", escape(a))).collect();
                write!(f, "CMD [{}]", args.join(", "))
            }
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Compile a recipe into its ordered build plan:
/// base, working directory, copy manifest, declared ports, environment
/// defaults, startup command.
pub fn plan(recipe: &Recipe) -> Result<Vec<BuildStep>, SkiffError> {
    recipe.validate()?;

    let mut steps = vec![
        BuildStep::From {
            image: recipe.base_ref()?,
        },
        BuildStep::Workdir {
            dir: recipe.image.workdir.clone(),
        },
    ];
    for step in &recipe.copy {
        steps.push(BuildStep::Copy {
            source: step.source.clone(),
            dest: step.dest.clone(),
        });
    }
    for port in &recipe.network.expose {
        steps.push(BuildStep::Expose { port: *port });
    }
    for (key, value) in &recipe.env {
        steps.push(BuildStep::Env {
            key: key.clone(),
            value: value.clone(),
        });
    }
    steps.push(BuildStep::Cmd {
        argv: recipe.process.command.clone(),
    });
    Ok(steps)
}

/// Render the build file text for a recipe, one directive per line.
pub fn render(recipe: &Recipe) -> Result<String, SkiffError> {
    let mut out = String::new();
    for step in plan(recipe)? {
        out.push_str(&step.to_string());
        out.push('\n');
    }
    Ok(out)
}
