//! Config generation counter stored at `<metadir>/version.json`.
//!
//! Every successful topology mutation bumps the generation so that peers and
//! management tooling can detect a changed rule set without diffing files.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const VERSION_FILE: &str = "version.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Version {
    version: i64,
}

/// Read the current generation. A missing file is generation 0.
pub fn read_version(meta_dir: impl AsRef<Path>) -> Result<i64, ConfigError> {
    let path = meta_dir.as_ref().join(VERSION_FILE);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let v: Version =
        serde_json::from_slice(&data).map_err(|source| ConfigError::Json { path, source })?;
    Ok(v.version)
}

/// Bump the generation to `max(now_unix_nanos, previous + 1)` and return it.
pub fn update_version(meta_dir: impl AsRef<Path>) -> Result<i64, ConfigError> {
    let meta_dir = meta_dir.as_ref();
    let previous = read_version(meta_dir)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let next = now.max(previous.saturating_add(1));

    let path = meta_dir.join(VERSION_FILE);
    let body = serde_json::to_vec(&Version { version: next }).map_err(|source| {
        ConfigError::Json {
            path: path.clone(),
            source,
        }
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|source| ConfigError::Io {
        path: tmp.clone(),
        source,
    })?;
    if let Err(source) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(ConfigError::Io { path, source });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), 0);
        let v1 = update_version(dir.path()).unwrap();
        let v2 = update_version(dir.path()).unwrap();
        assert!(v2 > v1);
        assert_eq!(read_version(dir.path()).unwrap(), v2);
    }

    #[test]
    fn test_version_survives_clock_behind_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), br#"{"version":9223372036854775000}"#)
            .unwrap();
        let v = update_version(dir.path()).unwrap();
        assert_eq!(v, 9223372036854775001);
    }

    #[test]
    fn test_failed_write_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = update_version(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("version.json.tmp").join("blocker")).unwrap();
        assert!(update_version(dir.path()).is_err());
        assert_eq!(read_version(dir.path()).unwrap(), v1);

        std::fs::remove_dir_all(dir.path().join("version.json.tmp")).unwrap();
        let v2 = update_version(dir.path()).unwrap();
        assert!(v2 > v1);
        assert!(!dir.path().join("version.json.tmp").exists());
    }

    #[test]
    fn test_update_fails_on_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(update_version(dir.path().join("absent")).is_err());
    }
}
