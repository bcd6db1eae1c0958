//! `lingo.toml` configuration.
//!
//! | Key           | Default              | Meaning                                  |
//! |---------------|----------------------|------------------------------------------|
//! | `scripts`     | `[]`                 | script files or directories to load      |
//! | `log`         | `"warn"`             | `tracing` filter when `RUST_LOG` is unset |
//! | `parse_depth` | `PARSE_DEPTH_LIMIT`  | placeholder nesting limit per line       |
//! | `match_steps` | `MATCH_STEP_BUDGET`  | matcher step budget per pattern attempt  |
//!
//! Relative `scripts` entries are resolved against the file's directory.
//! Without `-c`, the file is looked up in the platform config directory
//! (`~/.config/lingo/lingo.toml` on Linux); a missing default file is not an
//! error.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::pattern::MATCH_STEP_BUDGET;
use crate::script::loader::PARSE_DEPTH_LIMIT;

pub const FILE_NAME: &str = "lingo.toml";

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scripts: Vec<PathBuf>,
    pub log: String,
    pub parse_depth: usize,
    pub match_steps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            log: "warn".into(),
            parse_depth: PARSE_DEPTH_LIMIT,
            match_steps: MATCH_STEP_BUDGET,
        }
    }
}

impl Config {
    /// Parse TOML text.  `path` is only used in error messages.
    pub fn load_str(s: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(s)
            .map_err(|source| ConfigError::Toml { path: path.to_owned(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a config file, resolving relative script paths.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
        let mut cfg = Self::load_str(&s, path)?;
        if let Some(dir) = path.parent() {
            for p in &mut cfg.scripts {
                if p.is_relative() {
                    *p = dir.join(&*p);
                }
            }
        }
        Ok(cfg)
    }

    /// The explicit file if given, else the default file if present, else
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::load_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.parse_depth == 0 {
            return Err(ConfigError::Invalid("parse_depth must be at least 1".into()));
        }
        if self.match_steps == 0 {
            return Err(ConfigError::Invalid("match_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// `<platform config dir>/lingo.toml`, if the platform has one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "lingo").map(|dirs| dirs.config_dir().join(FILE_NAME))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
