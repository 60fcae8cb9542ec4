//! `polyvis.settings.json` configuration schema (spec §6, SPEC_FULL §2.3).
//!
//! Grounded in the teacher's reliance on `serde_json`/`dirs` as the
//! crate's ambient config backbone; the schema fields themselves are
//! specified in spec.md §6.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasePaths {
    pub resonance: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceSource {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSources {
    pub lexicon: PathBuf,
    pub cda: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sources {
    pub experience: Vec<ExperienceSource>,
    pub persona: PersonaSources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub database: DatabasePaths,
    pub sources: Sources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProvider {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSettings {
    pub active_provider: Option<String>,
    #[serde(default)]
    pub providers: HashMap<String, LlmProvider>,
}

/// Top-level settings (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub paths: Paths,
    #[serde(default)]
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paths: Paths {
                database: DatabasePaths {
                    resonance: PathBuf::from("./data/resonance.db"),
                },
                sources: Sources {
                    experience: vec![ExperienceSource {
                        path: PathBuf::from("./experience"),
                    }],
                    persona: PersonaSources {
                        lexicon: PathBuf::from("./persona/lexicon.json"),
                        cda: PathBuf::from("./persona/cda.json"),
                    },
                },
            },
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Load from `path`. A missing file falls back to [`Settings::default`]
    /// with a `warn` log (spec.md §7: Config/IO errors abort the current
    /// operation, not the process); malformed JSON is a hard error for the
    /// invoking command.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
