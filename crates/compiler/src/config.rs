//! Compiler configuration.
//!
//! The preprocessor core consumes an already-built `CompilerConfig`; the CLI
//! builds one from flags and, optionally, a TOML project file:
//!
//! ```toml
//! [preprocessor]
//! include-dirs = ["include", "vendor/include"]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Immutable configuration consumed by a `Compilation`.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Include search directories, in lookup order. The directory of the
    /// including file is always searched last.
    pub include_dirs: Vec<PathBuf>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Append one include search directory.
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Append several include search directories.
    pub fn with_include_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Load configuration from a TOML project file.
    pub fn from_project_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse config '{}': {}", path.display(), e))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let project: ProjectFile = toml::from_str(content).map_err(|e| e.to_string())?;

        let mut config = CompilerConfig::new();
        if let Some(preprocessor) = project.preprocessor {
            config.include_dirs = preprocessor.include_dirs;
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    preprocessor: Option<PreprocessorSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PreprocessorSection {
    #[serde(default)]
    include_dirs: Vec<PathBuf>,
}
