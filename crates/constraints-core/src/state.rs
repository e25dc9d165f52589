//! Process-wide state, built before the request loop starts.

use std::path::Path;

use constraints_lang::LanguageLevel;

use crate::compiler_config::CompilerConfig;
use crate::error::StartupError;
use crate::library::FixedLibrary;
use crate::sandbox::SandboxConfig;

/// Everything requests share. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct ServiceState {
    library: FixedLibrary,
    config: CompilerConfig,
    sandbox: SandboxConfig,
}

impl ServiceState {
    pub fn new(library: FixedLibrary, config: CompilerConfig, sandbox: SandboxConfig) -> Self {
        Self {
            library,
            config,
            sandbox,
        }
    }

    /// Resolve the compiler config, then load the library at that level.
    pub fn load(root: &Path, sandbox: SandboxConfig) -> Result<Self, StartupError> {
        let config = CompilerConfig::load(root)?;
        let library = FixedLibrary::load(root, config.level)?;
        tracing::info!(
            root = %root.display(),
            level = %config.level,
            timeout_ms = sandbox.timeout_ms.get(),
            "service state loaded"
        );
        Ok(Self::new(library, config, sandbox))
    }

    pub fn library(&self) -> &FixedLibrary {
        &self.library
    }

    pub fn level(&self) -> LanguageLevel {
        self.config.level
    }

    pub fn sandbox(&self) -> &SandboxConfig {
        &self.sandbox
    }
}
