//! Compiler configuration: `<root>/compiler.toml`.
//!
//! ```toml
//! [compiler]
//! level = "2021"
//! ```
//!
//! A missing `[compiler]` table or `level` key means the default level.
//! The level may be written as a string or a bare integer.

use std::path::Path;

use constraints_lang::LanguageLevel;
use serde::Deserialize;

use crate::error::StartupError;

pub const CONFIG_FILE: &str = "compiler.toml";

/// Resolved compiler settings, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerConfig {
    pub level: LanguageLevel,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compiler: Option<CompilerTable>,
}

#[derive(Debug, Default, Deserialize)]
struct CompilerTable {
    #[serde(default)]
    level: Option<LevelSetting>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LevelSetting {
    Text(String),
    Year(i64),
}

impl CompilerConfig {
    /// Read and resolve `<root>/compiler.toml`.
    pub fn load(root: &Path) -> Result<Self, StartupError> {
        let path = root.join(CONFIG_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| StartupError::ReadConfig {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&text, &path)
    }

    /// Resolve configuration text; `path` only labels errors.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, StartupError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| StartupError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;

        let level = match file.compiler.and_then(|c| c.level) {
            None => LanguageLevel::default(),
            Some(LevelSetting::Text(text)) => text.trim().parse()?,
            Some(LevelSetting::Year(year)) => year.to_string().parse()?,
        };
        Ok(Self { level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<CompilerConfig, StartupError> {
        CompilerConfig::from_toml_str(text, Path::new("compiler.toml"))
    }

    #[test]
    fn test_explicit_level() {
        assert_eq!(parse("[compiler]\nlevel = \"2019\"\n").unwrap().level, LanguageLevel::L2019);
        assert_eq!(parse("[compiler]\nlevel = 2022\n").unwrap().level, LanguageLevel::L2022);
    }

    #[test]
    fn test_defaults_when_unspecified() {
        assert_eq!(parse("").unwrap().level, LanguageLevel::L2021);
        assert_eq!(parse("[compiler]\n").unwrap().level, LanguageLevel::L2021);
        assert_eq!(parse("[other]\nkey = 1\n").unwrap().level, LanguageLevel::L2021);
    }

    #[test]
    fn test_unknown_level_is_fatal() {
        match parse("[compiler]\nlevel = \"1999\"\n") {
            Err(StartupError::Level(err)) => assert!(err.to_string().contains("1999")),
            other => panic!("expected Level, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_toml_is_fatal() {
        match parse("[compiler\nlevel = ") {
            Err(StartupError::ParseConfig { path, .. }) => assert_eq!(path, Path::new("compiler.toml")),
            other => panic!("expected ParseConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[compiler]\nlevel = \"2020\"\n").unwrap();
        assert_eq!(CompilerConfig::load(dir.path()).unwrap().level, LanguageLevel::L2020);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        match CompilerConfig::load(dir.path()) {
            Err(StartupError::ReadConfig { .. }) => {}
            other => panic!("expected ReadConfig, got {:?}", other),
        }
    }
}
