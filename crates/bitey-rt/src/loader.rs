use bitey_meta::ModuleMetadata;
use libloading::Library;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::PathBuf;

/// Where the native code of an artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactImage {
    /// A shared library on disk, opened with the platform loader.
    SharedLibrary(PathBuf),
    /// Code already mapped into this process, keyed by export name.
    Host(FxHashMap<String, usize>),
}

/// A compiled module as handed over by a toolchain: native code plus the
/// type metadata describing its exports.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub image: ArtifactImage,
    pub metadata: ModuleMetadata,
}

impl Artifact {
    pub fn shared_library(name: impl Into<String>, path: impl Into<PathBuf>, metadata: ModuleMetadata) -> Self {
        Artifact { name: name.into(), image: ArtifactImage::SharedLibrary(path.into()), metadata }
    }

    /// An artifact whose exports are already present in this process.
    pub fn host<I, S>(name: impl Into<String>, metadata: ModuleMetadata, exports: I) -> Self
    where
        I: IntoIterator<Item = (S, *const u8)>,
        S: Into<String>,
    {
        let exports = exports.into_iter().map(|(name, address)| (name.into(), address as usize)).collect();
        Artifact { name: name.into(), image: ArtifactImage::Host(exports), metadata }
    }
}

/// An opened image; dropping it unmaps a shared library.
pub(crate) enum LoadedImage {
    Library(Library),
    Host(FxHashMap<String, usize>),
}

impl fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadedImage::Library(library) => f.debug_tuple("Library").field(library).finish(),
            LoadedImage::Host(exports) => f.debug_tuple("Host").field(&exports.len()).finish(),
        }
    }
}

impl LoadedImage {
    pub(crate) fn open(image: ArtifactImage) -> Result<Self, String> {
        match image {
            ArtifactImage::SharedLibrary(path) => {
                log::debug!("Opening shared library {}", path.display());
                // SAFETY: opening runs the library's initializers; artifacts
                // come from the session's own toolchain.
                let library = unsafe { Library::new(&path) }
                    .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
                Ok(LoadedImage::Library(library))
            }
            ArtifactImage::Host(exports) => Ok(LoadedImage::Host(exports)),
        }
    }

    /// Address of an exported function or variable.
    pub(crate) fn resolve(&self, name: &str) -> Result<usize, String> {
        match self {
            LoadedImage::Library(library) => {
                // SAFETY: the symbol is only read as an address here.
                let symbol = unsafe { library.get::<*const u8>(name.as_bytes()) }
                    .map_err(|e| format!("symbol `{}` is not exported: {}", name, e))?;
                Ok(*symbol as usize)
            }
            LoadedImage::Host(exports) => exports
                .get(name)
                .copied()
                .ok_or_else(|| format!("symbol `{}` is not exported", name)),
        }
    }
}
