//! Persisted daemon configuration.
//!
//! Stored as pretty-printed JSON at `$DOCSYNC_CONFIG`, or
//! `<config dir>/docsync/sync.json` when the variable is unset. The file
//! holds the bearer token, so on Unix it is kept at mode 0600.
//!
//! The sync cursor lives in the same file (`lastSyncAt`) and is rewritten
//! every time a reconciler advances it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sync_core::cursor::{CursorError, CursorStore};
use sync_core::images::BlobHost;
use thiserror::Error;
use tracing::debug;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "DOCSYNC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config directory on this platform; set DOCSYNC_CONFIG")]
    NoConfigDir,

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Local directory to mirror (supports ~ for home directory)
    #[serde(default)]
    pub sync_root: String,
    /// Base URL of the document server
    #[serde(default)]
    pub server_url: String,
    /// Bearer token; empty disables push and pull
    #[serde(default)]
    pub auth_token: String,
    /// Sync cursor from the last completed fetch or apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,
    /// Host serving uploaded images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_host: Option<String>,
}

impl Config {
    /// Sync root with a leading `~` expanded.
    pub fn sync_root_path(&self) -> PathBuf {
        expand_tilde(&self.sync_root)
    }

    pub fn blob_host(&self) -> BlobHost {
        match self.blob_host.as_deref() {
            Some(host) if !host.trim().is_empty() => BlobHost::new(host),
            _ => BlobHost::default(),
        }
    }

    /// Whether the settings needed to start the daemon are present.
    pub fn is_complete(&self) -> bool {
        !self.sync_root.trim().is_empty()
            && !self.server_url.trim().is_empty()
            && self.has_auth()
    }

    pub fn has_auth(&self) -> bool {
        !self.auth_token.trim().is_empty()
    }
}

/// Default config file location.
pub fn default_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("docsync").join("sync.json"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let path = path.trim();
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

/// Load the config at `path`. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Config>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `config` to `path`, creating parent directories.
pub fn save(path: &Path, config: &Config) -> Result<()> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }

    debug!("Saved config to {}", path.display());
    Ok(())
}

/// A config bound to its file. Every cursor advance is written through.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: Config) -> Self {
        Self { path, config }
    }

    /// Load the config at `path`, starting empty when the file is missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let config = load(&path)?.unwrap_or_default();
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Modify the config and save it.
    pub fn update(&mut self, f: impl FnOnce(&mut Config)) -> Result<()> {
        f(&mut self.config);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        save(&self.path, &self.config)
    }
}

impl CursorStore for ConfigStore {
    fn cursor(&self) -> Option<String> {
        self.config
            .last_sync_at
            .clone()
            .filter(|cursor| !cursor.is_empty())
    }

    fn advance(&mut self, cursor: String) -> std::result::Result<(), CursorError> {
        self.config.last_sync_at = Some(cursor);
        self.save().map_err(|e| CursorError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Config {
        Config {
            sync_root: "~/docs".into(),
            server_url: "https://app.example.com".into(),
            auth_token: "secret".into(),
            last_sync_at: None,
            blob_host: None,
        }
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load(&dir.path().join("sync.json")).unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sync.json");

        save(&path, &sample()).unwrap();
        let loaded = load(&path).unwrap().unwrap();

        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_json_keys_are_camel_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.json");
        save(&path, &sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["syncRoot"], "~/docs");
        assert_eq!(raw["serverUrl"], "https://app.example.com");
        assert_eq!(raw["authToken"], "secret");
        assert!(raw.get("lastSyncAt").is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.json");
        save(&path, &sample()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/docs"), home.join("docs"));
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde("/abs/docs"), PathBuf::from("/abs/docs"));
    }

    #[test]
    fn test_blob_host_default_and_override() {
        let mut config = sample();
        assert_eq!(config.blob_host(), BlobHost::default());

        config.blob_host = Some("blobs.example.com".into());
        assert!(config.blob_host().matches("https://x.blobs.example.com/a.png"));
    }

    #[test]
    fn test_completeness_requires_token() {
        let mut config = sample();
        assert!(config.is_complete());
        config.auth_token = "  ".into();
        assert!(!config.has_auth());
        assert!(!config.is_complete());
    }

    #[test]
    fn test_cursor_advance_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.json");
        let mut store = ConfigStore::new(path.clone(), sample());
        assert_eq!(store.cursor(), None);

        store.advance("2026-01-01T00:00:00.000Z".into()).unwrap();

        let reopened = ConfigStore::open(path).unwrap();
        assert_eq!(reopened.cursor().as_deref(), Some("2026-01-01T00:00:00.000Z"));
        assert_eq!(reopened.config().auth_token, "secret");
    }

    #[test]
    fn test_empty_cursor_counts_as_none() {
        let mut config = sample();
        config.last_sync_at = Some(String::new());
        let store = ConfigStore::new(PathBuf::from("unused.json"), config);
        assert_eq!(store.cursor(), None);
    }
}
