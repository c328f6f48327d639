//! Artifact manifests: a JSON file naming a shared library and carrying the
//! type metadata its toolchain reported.
//!
//! ```json
//! { "name": "geometry", "library": "libgeometry.so", "metadata": { "types": [], "symbols": [] } }
//! ```

use crate::error::CliError;
use bitey_rt::{Artifact, ModuleMetadata};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    /// Relative paths are looked up next to the manifest first, then in the
    /// search paths.
    pub library: PathBuf,
    #[serde(default)]
    pub metadata: ModuleMetadata,
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::IoError {
            path: path.to_path_buf(),
            operation: "read manifest",
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::ManifestError { path: path.to_path_buf(), source })
    }

    /// Finds the library on disk.
    pub fn locate_library(&self, manifest_dir: &Path, search_paths: &[PathBuf]) -> Result<PathBuf, CliError> {
        if self.library.is_absolute() {
            return if self.library.is_file() {
                Ok(self.library.clone())
            } else {
                Err(CliError::LibraryNotFound {
                    library: self.library.clone(),
                    searched: self.library.display().to_string(),
                })
            };
        }

        let candidates: Vec<PathBuf> = std::iter::once(manifest_dir)
            .chain(search_paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(&self.library))
            .collect();
        if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
            log::debug!("Found library for `{}` at {}", self.name, found.display());
            return Ok(found.clone());
        }
        Err(CliError::LibraryNotFound {
            library: self.library.clone(),
            searched: candidates.iter().map(|c| c.display().to_string()).collect::<Vec<_>>().join(", "),
        })
    }

    /// Reads the manifest at `path` and turns it into a loadable artifact.
    pub fn artifact(path: &Path, search_paths: &[PathBuf]) -> Result<Artifact, CliError> {
        let manifest = Self::read(path)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let library = manifest.locate_library(dir, search_paths)?;
        Ok(Artifact::shared_library(manifest.name, library, manifest.metadata))
    }
}
