//! Named modules of one interactive session.

use crate::{Artifact, BindError, Module};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Options forwarded to the toolchain untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub flags: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub optimize: bool,
}

/// Compiler diagnostics, passed through as produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("compilation failed: {message}")]
#[diagnostic(code(bitey::toolchain::failed))]
pub struct ToolchainError {
    pub message: String,
    pub diagnostics: Vec<String>,
}

impl ToolchainError {
    pub fn new(message: impl Into<String>) -> Self {
        ToolchainError { message: message.into(), diagnostics: Vec::new() }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl IntoIterator<Item = String>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}

/// Turns source text into a loadable artifact.
pub trait Toolchain: Send + Sync {
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<Artifact, ToolchainError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("no toolchain configured for this session")]
    #[diagnostic(code(bitey::session::no_toolchain))]
    NoToolchain,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bind(#[from] BindError),
}

/// Session state owned by the front-end: the modules loaded so far, by
/// name, and the toolchain used to build new ones.
#[derive(Default)]
pub struct Session {
    modules: FxHashMap<String, Module>,
    toolchain: Option<Box<dyn Toolchain>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toolchain(toolchain: impl Toolchain + 'static) -> Self {
        Session { modules: FxHashMap::default(), toolchain: Some(Box::new(toolchain)) }
    }

    /// Compiles `source` and loads the result under `name`.
    pub fn compile_and_load(
        &mut self,
        name: &str,
        source: &str,
        options: &CompileOptions,
    ) -> Result<Module, SessionError> {
        let toolchain = self.toolchain.as_ref().ok_or(SessionError::NoToolchain)?;
        log::debug!("Compiling `{}` ({} bytes of source)", name, source.len());
        let mut artifact = toolchain.compile(source, options)?;
        artifact.name = name.to_string();
        Ok(self.load_named(name, artifact)?)
    }

    /// Loads `artifact` under `name`, replacing an earlier module of the same
    /// name.
    ///
    /// A replacement is refused when a symbol exported by both modules
    /// changed its type: the new module is unloaded, the old one stays and
    /// the error names the symbol with both signatures.
    pub fn load_named(&mut self, name: &str, artifact: Artifact) -> Result<Module, BindError> {
        let module = Module::load(artifact)?;
        if let Some(previous) = self.modules.get(name) {
            for entry in module.symbols() {
                let Some(old) = previous.symbol(&entry.name) else {
                    continue;
                };
                if old.descriptor != entry.descriptor {
                    module.unload();
                    log::warn!("Refusing to reload `{}`: `{}` changed type", name, entry.name);
                    return Err(BindError::LayoutMismatch {
                        symbol: entry.name.clone(),
                        cause: format!("redefined from `{}` to `{}`", old.descriptor, entry.descriptor),
                    });
                }
            }
            previous.unload();
            log::info!("Replaced module `{}`", name);
        }
        self.modules.insert(name.to_string(), module.clone());
        Ok(module)
    }

    /// Unloads and forgets the module called `name`.
    pub fn unload(&mut self, name: &str) -> bool {
        match self.modules.remove(name) {
            Some(module) => {
                module.unload();
                true
            }
            None => false,
        }
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for module in self.modules.values() {
            module.unload();
        }
    }
}
