//! The fixed library units every bundle starts with.
//!
//! Both files live under `<root>/libs/`, are read and parsed once at
//! startup, and are shared by every request afterwards.

use std::path::Path;
use std::sync::Arc;

use constraints_lang::{LanguageLevel, ParsedUnit};
use sha2::{Digest, Sha256};

use crate::error::StartupError;
use crate::obs::emit_library_loaded;

pub const LIBS_DIR: &str = "libs";
pub const AST_FILE: &str = "constraints-ast.edsl";
pub const FLUENT_FILE: &str = "constraints-edsl-fluent-api.edsl";

/// Fixed files, in bundle order.
pub const LIBRARY_FILES: [&str; 2] = [AST_FILE, FLUENT_FILE];

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A parsed library file and the digest of its text.
#[derive(Debug, Clone)]
pub struct LibraryUnit {
    pub unit: Arc<ParsedUnit>,
    pub sha256: String,
}

/// The fixed library, immutable once loaded.
#[derive(Debug, Clone)]
pub struct FixedLibrary {
    units: Vec<LibraryUnit>,
}

impl FixedLibrary {
    /// Read and parse both library files from `<root>/libs/`.
    pub fn load(root: &Path, level: LanguageLevel) -> Result<Self, StartupError> {
        let dir = root.join(LIBS_DIR);
        let mut sources = Vec::with_capacity(LIBRARY_FILES.len());
        for file in LIBRARY_FILES {
            let path = dir.join(file);
            let text = std::fs::read_to_string(&path)
                .map_err(|source| StartupError::ReadLibrary { path, source })?;
            sources.push((file, text));
        }
        Self::from_sources(sources, level)
    }

    /// Parse library sources given as `(file name, text)` in bundle order.
    ///
    /// A syntax error in any of them is fatal: the service cannot compile
    /// anything without its library.
    pub fn from_sources<N: Into<String>>(
        sources: impl IntoIterator<Item = (N, String)>,
        level: LanguageLevel,
    ) -> Result<Self, StartupError> {
        let mut units = Vec::new();
        for (name, text) in sources {
            let sha256 = sha256_hex(text.as_bytes());
            let bytes = text.len();
            let unit = ParsedUnit::parse(name, text, level);
            if let Some(first) = unit.diagnostics.first() {
                return Err(StartupError::LibrarySyntax {
                    file: unit.source.name().to_string(),
                    first: first.to_record(&unit.source).to_string(),
                });
            }
            emit_library_loaded(unit.source.name(), bytes, &sha256);
            units.push(LibraryUnit {
                unit: Arc::new(unit),
                sha256,
            });
        }
        Ok(Self { units })
    }

    /// Parsed units, in bundle order.
    pub fn units(&self) -> impl Iterator<Item = &Arc<ParsedUnit>> {
        self.units.iter().map(|u| &u.unit)
    }

    pub fn digest(&self, file: &str) -> Option<&str> {
        self.units
            .iter()
            .find(|u| u.unit.source.name() == file)
            .map(|u| u.sha256.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_libs(root: &Path, ast: &str, fluent: &str) {
        let dir = root.join(LIBS_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(AST_FILE), ast).unwrap();
        std::fs::write(dir.join(FLUENT_FILE), fluent).unwrap();
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_load_in_bundle_order() {
        let dir = tempfile::tempdir().unwrap();
        write_libs(dir.path(), "type Windows;", "fn always() -> Windows { return node Windows {}; }");
        let library = FixedLibrary::load(dir.path(), LanguageLevel::default()).unwrap();

        let names: Vec<&str> = library.units().map(|u| u.source.name()).collect();
        assert_eq!(names, [AST_FILE, FLUENT_FILE]);
        assert_eq!(library.digest(AST_FILE), Some(sha256_hex(b"type Windows;").as_str()));
        assert_eq!(library.digest("other.edsl"), None);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(LIBS_DIR)).unwrap();
        std::fs::write(dir.path().join(LIBS_DIR).join(AST_FILE), "type Windows;").unwrap();
        match FixedLibrary::load(dir.path(), LanguageLevel::default()) {
            Err(StartupError::ReadLibrary { path, .. }) => assert!(path.ends_with(FLUENT_FILE)),
            other => panic!("expected ReadLibrary, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        match FixedLibrary::from_sources([(AST_FILE, "type ;".to_string())], LanguageLevel::default()) {
            Err(StartupError::LibrarySyntax { file, first }) => {
                assert_eq!(file, AST_FILE);
                assert!(first.starts_with("constraints-ast.edsl:1:6: syntax"), "{first}");
            }
            other => panic!("expected LibrarySyntax, got {:?}", other),
        }
    }

    #[test]
    fn test_level_gates_library_syntax() {
        let source = ("lib.edsl", "fn f() -> number { return 2 ** 3; }".to_string());
        assert!(FixedLibrary::from_sources([source.clone()], LanguageLevel::L2020).is_ok());
        assert!(FixedLibrary::from_sources([source], LanguageLevel::L2019).is_err());
    }
}
