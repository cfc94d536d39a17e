use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thrap_crypto::{algorithm_from_name, HashAlgorithm};
use thrap_registry::{IDENTITY_PREFIX, STACK_PREFIX};

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "thrap.toml";
pub const DEFAULT_DATA_DIR: &str = ".thrap";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Single-file redb database in the data directory.
    Redb,
    /// Process-local; nothing persists between runs.
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where the config lives; never written to the file.
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub hash: String,
    pub engine: EngineKind,
    pub stack_prefix: String,
    pub identity_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            hash: "blake3".into(),
            engine: EngineKind::Redb,
            stack_prefix: STACK_PREFIX.into(),
            identity_prefix: IDENTITY_PREFIX.into(),
        }
    }
}

impl StoreConfig {
    /// Read `thrap.toml` from `data_dir`, or fall back to defaults when the
    /// file does not exist.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<StoreConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            StoreConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Write `thrap.toml` into the data directory and return its path.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        let path = self.path();
        let text = toml::to_string_pretty(self).context("encoding config")?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn algorithm(&self) -> anyhow::Result<Arc<dyn HashAlgorithm>> {
        Ok(algorithm_from_name(&self.hash)?)
    }
}
