//! Runtime configuration resolution for the `potcar` binary.
//!
//! Precedence: command-line flag, then environment (`POTCAR_DB`,
//! `POTCAR_LOG_LEVEL`, `POTCAR_LOG_DIR`, handled by clap), then the platform
//! data directory.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const DB_FILE_NAME: &str = "potcar.db";
const LOG_DIR_NAME: &str = "logs";

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn resolve(
        db: Option<PathBuf>,
        log_level: Option<String>,
        log_dir: Option<PathBuf>,
    ) -> Result<Self, String> {
        let data_dir = match (&db, &log_dir) {
            (Some(_), Some(_)) => None,
            _ => Some(default_data_dir()?),
        };
        let from_data_dir = |name: &str| {
            data_dir
                .as_deref()
                .map(|dir| dir.join(name))
                .unwrap_or_default()
        };

        let db_path = db.unwrap_or_else(|| from_data_dir(DB_FILE_NAME));
        let log_dir = log_dir.unwrap_or_else(|| from_data_dir(LOG_DIR_NAME));
        Ok(Self {
            db_path,
            log_level: log_level
                .unwrap_or_else(|| potcar_core::default_log_level().to_string()),
            log_dir: absolutize(&log_dir)?,
        })
    }
}

fn default_data_dir() -> Result<PathBuf, String> {
    ProjectDirs::from("", "potcar", "potcar")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| "cannot determine a home directory for default paths".to_string())
}

fn absolutize(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| format!("cannot resolve `{}`: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfig;
    use std::path::PathBuf;

    #[test]
    fn explicit_paths_win_over_defaults() {
        let config = RuntimeConfig::resolve(
            Some(PathBuf::from("/tmp/store.db")),
            Some("warn".to_string()),
            Some(PathBuf::from("/tmp/potcar-logs")),
        )
        .expect("resolve");
        assert_eq!(config.db_path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, PathBuf::from("/tmp/potcar-logs"));
    }

    #[test]
    fn relative_log_dir_becomes_absolute() {
        let config = RuntimeConfig::resolve(
            Some(PathBuf::from("store.db")),
            None,
            Some(PathBuf::from("logs")),
        )
        .expect("resolve");
        assert!(config.log_dir.is_absolute());
        assert_eq!(config.log_level, potcar_core::default_log_level());
    }
}
