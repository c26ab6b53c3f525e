use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SkiffError;

/// Reference to a base runtime image, e.g. `python:3.11.3`.
///
/// A missing tag resolves to `latest`. A colon inside the last path
/// segment separates the tag; a colon in a registry host (`host:5000/app`)
/// does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl FromStr for ImageRef {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(SkiffError::InvalidRecipe {
                reason: format!("invalid image reference: {s:?}"),
            });
        }
        let (name, tag) = match s.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (s, "latest"),
        };
        if name.is_empty() || tag.is_empty() {
            return Err(SkiffError::InvalidRecipe {
                reason: format!("invalid image reference: {s:?}"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// One entry of the file-copy manifest. `source` is relative to the build
/// context, `dest` is resolved against the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyStep {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    pub base: String,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    /// Declared ports. Metadata only; nothing here binds them.
    #[serde(default)]
    pub expose: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSection {
    /// Startup command argument vector, the container's first process.
    pub command: Vec<String>,
}

/// The build-time record: everything needed to assemble an image and start
/// a container from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub name: String,
    pub image: ImageSection,
    #[serde(default = "default_copy")]
    pub copy: Vec<CopyStep>,
    #[serde(default)]
    pub network: NetworkSection,
    /// Environment defaults; overridable at container start. Ordered so
    /// planning and rendering stay deterministic.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub process: ProcessSection,
}

fn default_copy() -> Vec<CopyStep> {
    vec![CopyStep {
        source: ".".to_string(),
        dest: ".".to_string(),
    }]
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            image: ImageSection {
                base: "python:3.11.3".to_string(),
                workdir: PathBuf::from("/app"),
            },
            copy: default_copy(),
            network: NetworkSection { expose: vec![8080] },
            env: BTreeMap::from([("NAME".to_string(), "Bot".to_string())]),
            process: ProcessSection {
                command: vec!["python".to_string(), "main.py".to_string()],
            },
        }
    }
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self, SkiffError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SkiffError::InvalidRecipe {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let recipe: Recipe = toml::from_str(&raw).map_err(|e| SkiffError::InvalidRecipe {
            reason: e.to_string(),
        })?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn base_ref(&self) -> Result<ImageRef, SkiffError> {
        self.image.base.parse()
    }

    pub fn validate(&self) -> Result<(), SkiffError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(SkiffError::InvalidRecipe {
                reason: format!("invalid recipe name: {:?}", self.name),
            });
        }
        self.base_ref()?;
        if !self.image.workdir.is_absolute() {
            return Err(SkiffError::InvalidRecipe {
                reason: format!(
                    "working directory must be absolute: {}",
                    self.image.workdir.display()
                ),
            });
        }
        if self.copy.is_empty() {
            return Err(SkiffError::InvalidRecipe {
                reason: "copy manifest is empty".to_string(),
            });
        }
        for step in &self.copy {
            validate_copy_path(&step.source, "source")?;
            if step.dest.is_empty() || has_parent_component(&step.dest) {
                return Err(SkiffError::InvalidRecipe {
                    reason: format!("invalid copy destination: {:?}", step.dest),
                });
            }
        }
        if self.network.expose.iter().any(|p| *p == 0) {
            return Err(SkiffError::InvalidRecipe {
                reason: "declared port must be non-zero".to_string(),
            });
        }
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                return Err(SkiffError::InvalidRecipe {
                    reason: format!("invalid environment key: {key:?}"),
                });
            }
        }
        if self.process.command.is_empty() {
            return Err(SkiffError::InvalidRecipe {
                reason: "startup command is empty".to_string(),
            });
        }
        if self.process.command.iter().any(|arg| arg.is_empty()) {
            return Err(SkiffError::InvalidRecipe {
                reason: "startup command contains an empty argument".to_string(),
            });
        }
        Ok(())
    }

    /// Environment visible to the started process: recipe defaults with
    /// `overrides` taking precedence.
    pub fn merged_env(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = self.env.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// The file the startup command names, when it names one: the second
    /// argv element if it is a relative path (`python main.py` -> `main.py`).
    /// Used only for advisory checks; the payload copy stays verbatim.
    pub fn entry_file(&self) -> Option<&str> {
        let arg = self.process.command.get(1)?;
        if arg.starts_with('-') || Path::new(arg).is_absolute() {
            return None;
        }
        Some(arg)
    }
}

fn validate_copy_path(path: &str, role: &str) -> Result<(), SkiffError> {
    if path.is_empty() || Path::new(path).is_absolute() || has_parent_component(path) {
        return Err(SkiffError::InvalidRecipe {
            reason: format!("invalid copy {role}: {path:?}"),
        });
    }
    Ok(())
}

fn has_parent_component(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Parse a `KEY=VALUE` override as supplied on the command line.
pub fn parse_env_pair(s: &str) -> Result<(String, String), SkiffError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(SkiffError::InvalidRecipe {
            reason: format!("environment override must be KEY=VALUE: {s:?}"),
        }),
    }
}
