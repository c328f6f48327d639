use crate::error::CliError;
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Contents of `bitey.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log: LogConfig,
    pub loader: LoaderConfig,

    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directories searched for libraries that are not found next to their
    /// manifest. Relative entries are taken relative to the config file.
    pub search_paths: Vec<PathBuf>,
}

impl Config {
    pub const FILE_NAME: &'static str = "bitey.toml";

    /// Reads `explicit` if given, else `bitey.toml` in `dir` if it exists,
    /// else returns the defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, CliError> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let candidate = dir.join(Self::FILE_NAME);
                if candidate.is_file() {
                    Self::read(&candidate)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::IoError {
            path: path.to_path_buf(),
            operation: "read config",
            source,
        })?;
        let mut config = Self::parse(&text, path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for entry in &mut config.loader.search_paths {
            if entry.is_relative() {
                *entry = base.join(&*entry);
            }
        }
        config.source = Some(path.to_path_buf());
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|source| CliError::ConfigError { path: path.to_path_buf(), source })
    }

    /// The configured log level, if any.
    pub fn log_level(&self) -> Result<Option<LevelFilter>, CliError> {
        let Some(level) = &self.log.level else {
            return Ok(None);
        };
        LevelFilter::from_str(level).map(Some).map_err(|_| CliError::LogLevel {
            path: self.source.clone().unwrap_or_else(|| PathBuf::from(Self::FILE_NAME)),
            level: level.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(None, dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level().unwrap(), None);
    }

    #[test]
    fn test_discovers_file_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(Config::FILE_NAME),
            "[log]\nlevel = \"debug\"\n\n[loader]\nsearch_paths = [\"lib\", \"/opt/bitey/lib\"]\n",
        )
        .unwrap();

        let config = Config::discover(None, dir.path()).unwrap();
        assert_eq!(config.log_level().unwrap(), Some(LevelFilter::Debug));
        assert_eq!(
            config.loader.search_paths,
            [dir.path().join("lib"), PathBuf::from("/opt/bitey/lib")]
        );
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("other.toml");
        assert!(matches!(Config::discover(Some(&missing), dir.path()), Err(CliError::IoError { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::parse("[loader]\nsearch_path = []\n", Path::new("bitey.toml")).unwrap_err();
        assert!(matches!(err, CliError::ConfigError { .. }));
    }

    #[test]
    fn test_bad_log_level() {
        let config = Config::parse("[log]\nlevel = \"loud\"\n", Path::new("bitey.toml")).unwrap();
        assert!(matches!(config.log_level(), Err(CliError::LogLevel { level, .. }) if level == "loud"));
    }
}
