//! Runtime configuration: store-tier roots, cache mode and the
//! post-processor cadence.
//!
//! An optional `<meta_root>/routefs.toml` overrides the compiled defaults.
//! Tier roots are resolved here, before any store or index is constructed,
//! so nothing ever binds to a half-initialized root.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{map_io_error, FsError, FsResult};

/// Optional configuration file name under the meta root.
pub const CONFIG_FILE: &str = "routefs.toml";

/// Default pause between post-processor sweeps.
pub const DEFAULT_POSTPROCESS_INTERVAL: Duration = Duration::from_secs(30);

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the embedded indexes, `.type.map` and the config file.
    pub meta_root: PathBuf,
    /// Hot/staging tier root; also the `*` route default and the post-init
    /// anchor for relative lookups.
    pub data_root: String,
    /// Cold/archival tier root.
    pub archive_root: String,
    /// Keep hot and cold copies concurrently instead of moving between tiers.
    pub cache_mode: bool,
    /// Pause between background post-processor sweeps.
    pub postprocess_interval: Duration,
    /// Additional registered store roots beyond the two tiers.
    pub extra_stores: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_root: Option<String>,
    archive_root: Option<String>,
    cache_mode: Option<bool>,
    postprocess_interval_secs: Option<u64>,
    stores: Vec<String>,
}

impl Config {
    /// Compiled defaults for the given meta root.
    pub fn new(meta_root: impl Into<PathBuf>) -> Self {
        let meta_root = meta_root.into();
        let data_root = meta_root.join("data").to_string_lossy().into_owned();
        let archive_root = meta_root.join("archive").to_string_lossy().into_owned();
        Self {
            meta_root,
            data_root,
            archive_root,
            cache_mode: true,
            postprocess_interval: DEFAULT_POSTPROCESS_INTERVAL,
            extra_stores: Vec::new(),
        }
    }

    /// Defaults overridden by `<meta_root>/routefs.toml` when present.
    pub fn load(meta_root: impl Into<PathBuf>) -> FsResult<Self> {
        let mut config = Self::new(meta_root);
        let path = config.meta_root.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(config);
            }
            Err(err) => return Err(map_io_error(err)),
        };
        let file: FileConfig = toml::from_str(&raw).map_err(|err| {
            error!(path = %path.display(), %err, "cannot parse config file");
            FsError::InvalidArgument
        })?;
        if let Some(data_root) = file.data_root {
            config.data_root = data_root;
        }
        if let Some(archive_root) = file.archive_root {
            config.archive_root = archive_root;
        }
        if let Some(cache_mode) = file.cache_mode {
            config.cache_mode = cache_mode;
        }
        if let Some(secs) = file.postprocess_interval_secs {
            config.postprocess_interval = Duration::from_secs(secs);
        }
        config.extra_stores = file.stores;
        Ok(config)
    }

    /// Registered valid store roots: both tiers plus any configured extras.
    pub fn volumes(&self) -> Vec<String> {
        let mut volumes = vec![self.data_root.clone(), self.archive_root.clone()];
        for store in &self.extra_stores {
            if !volumes.contains(store) {
                volumes.push(store.clone());
            }
        }
        volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "data_root = \"/data/hot\"\narchive_root = \"/data/cold\"\ncache_mode = false\npostprocess_interval_secs = 5\nstores = [\"/data/extra\"]\n",
        )
        .expect("write config");

        let config = Config::load(dir.path()).expect("load config");
        assert_eq!(config.data_root, "/data/hot");
        assert_eq!(config.archive_root, "/data/cold");
        assert!(!config.cache_mode);
        assert_eq!(config.postprocess_interval, Duration::from_secs(5));
        assert_eq!(
            config.volumes(),
            vec!["/data/hot".to_owned(), "/data/cold".to_owned(), "/data/extra".to_owned()]
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let config = Config::load(dir.path()).expect("load config");
        assert!(config.cache_mode);
        assert!(config.data_root.ends_with("/data"));
        assert!(config.archive_root.ends_with("/archive"));
    }
}
