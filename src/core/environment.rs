use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use super::catalog::{load_catalog, CatalogSource};
use crate::store::{Node, StoreError, Value};

pub const CONFIG_FILE: &str = "environment.json";
const KEYS: &str = "keys";

fn default_config() -> Node {
    let mut config = Node::new();
    config.update(
        json!({
            "model": {
                "demucs": "../resources/files/models/demucs",
                "so-vits": "../resources/files/models/so-vits"
            },
            "preset": {
                "demucs": "../resources/files/presets/demucs",
                "so-vits": "../resources/files/presets/so-vits"
            },
            "dataset": {
                "demucs": "../resources/files/datasets/demucs",
                "so-vits": "../resources/files/datasets/so-vits"
            },
            "output": "../resources/files/output",
            "sources": "../resources/files/sources.json",
            "sources_export": "../resources/files/sources_export.json",
            "key_path": "../resources/files/keys",
            "keys": {}
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    );
    config
}

/// Runtime configuration and resource catalog, built once at startup.
///
/// Relative paths in `environment.json` resolve against the directory that
/// holds the file.
#[derive(Debug, Clone)]
pub struct Environment {
    config_path: PathBuf,
    base_dir: PathBuf,
    config: Node,
    sources: Node,
}

impl Environment {
    /// Loads (or creates) the config, lays out the resource directories,
    /// loads the catalog and reads the key files.
    pub fn bootstrap(config_path: impl AsRef<Path>, catalog: &dyn CatalogSource) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let config = load_config(&config_path)?;
        let mut env = Self {
            config_path,
            base_dir,
            config,
            sources: Node::new(),
        };

        info!("building file structures");
        env.ensure_directories()?;
        env.sources = load_catalog(&env.sources_path()?, catalog)?;
        env.load_keys()?;
        info!("environment ready");
        Ok(env)
    }

    /// Re-reads the config file and the catalog.
    pub fn reload(&mut self, catalog: &dyn CatalogSource) -> Result<()> {
        let keys = self.config.entry_value(KEYS).cloned();
        self.config = load_config(&self.config_path)?;
        if let Some(keys) = keys {
            self.config.insert(KEYS, keys);
        }
        self.sources = load_catalog(&self.sources_path()?, catalog)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &Node {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Node {
        &mut self.config
    }

    pub fn sources(&self) -> &Node {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut Node {
        &mut self.sources
    }

    pub fn model_dir(&self, engine: &str) -> Result<PathBuf, StoreError> {
        self.engine_dir("model", engine)
    }

    pub fn preset_dir(&self, engine: &str) -> Result<PathBuf, StoreError> {
        self.engine_dir("preset", engine)
    }

    pub fn dataset_dir(&self, engine: &str) -> Result<PathBuf, StoreError> {
        self.engine_dir("dataset", engine)
    }

    /// Directory for resources of `kind` (`models`, `presets`, `datasets`).
    /// Any other kind lands in the model directory.
    pub fn resource_dir(&self, engine: &str, kind: &str) -> Result<PathBuf, StoreError> {
        match kind.trim_end_matches('s') {
            "preset" => self.preset_dir(engine),
            "dataset" => self.dataset_dir(engine),
            _ => self.model_dir(engine),
        }
    }

    pub fn output_dir(&self) -> Result<PathBuf, StoreError> {
        self.path_at("output")
    }

    pub fn sources_path(&self) -> Result<PathBuf, StoreError> {
        self.path_at("sources")
    }

    pub fn sources_export_path(&self) -> Result<PathBuf, StoreError> {
        self.path_at("sources_export")
    }

    pub fn key_dir(&self) -> Result<PathBuf, StoreError> {
        self.path_at("key_path")
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.config
            .node(KEYS)
            .and_then(|keys| keys.entry_value(name))
            .and_then(Value::as_str)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        let mut dirs = Vec::new();
        for section in ["model", "preset", "dataset"] {
            let engines = self.config.node(section).ok_or_else(|| {
                StoreError::not_found(section, &[])
            })?;
            for engine in engines.keys() {
                dirs.push(self.engine_dir(section, engine)?);
            }
        }
        dirs.push(self.output_dir()?);
        dirs.push(self.key_dir()?);

        for dir in dirs {
            fs::create_dir_all(&dir).with_context(|| format!("create dir {dir:?}"))?;
        }
        Ok(())
    }

    /// Reads every non-empty file under `key_path` into `keys.<file stem>`.
    pub fn load_keys(&mut self) -> Result<usize> {
        let key_dir = self.key_dir()?;
        let mut keys = match self.config.entry_value(KEYS) {
            Some(Value::Node(keys)) => keys.clone(),
            _ => Node::new(),
        };
        let mut loaded = 0;

        let entries = fs::read_dir(&key_dir).with_context(|| format!("read dir {key_dir:?}"))?;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!("skipping unreadable entry in {}: {error}", key_dir.display());
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read key file {path:?}"))?;
            let key = contents.trim_matches(|c| c == '\n' || c == '\r' || c == ' ');
            if key.is_empty() {
                warn!("key file {} is empty", path.display());
                continue;
            }
            debug!("loaded key `{stem}`");
            keys.insert(stem, key);
            loaded += 1;
        }

        self.config.insert(KEYS, keys);
        Ok(loaded)
    }

    /// Writes the config back; loaded keys stay in memory only.
    pub fn save_config(&self) -> Result<()> {
        let mut persisted = self.config.clone();
        persisted.insert(KEYS, Node::new());
        persisted
            .save(&self.config_path)
            .with_context(|| format!("write config to {:?}", self.config_path))
    }

    pub fn save_sources(&self) -> Result<()> {
        let path = self.sources_path()?;
        self.sources
            .save(&path)
            .with_context(|| format!("write catalog to {path:?}"))
    }

    /// Writes the publishable catalog to `sources_export` and returns it.
    pub fn export_sources(&self, force_include_private: bool) -> Result<Node> {
        let path = self.sources_export_path()?;
        let exported = self.sources.export(force_include_private);
        exported
            .save(&path)
            .with_context(|| format!("write exported catalog to {path:?}"))?;
        info!("exported catalog to {}", path.display());
        Ok(exported)
    }

    fn engine_dir(&self, section: &str, engine: &str) -> Result<PathBuf, StoreError> {
        let raw = self
            .config
            .node(section)
            .ok_or_else(|| StoreError::not_found(section, &[]))?
            .entry_value(engine)
            .ok_or_else(|| StoreError::not_found(&format!("{section}.{engine}"), &[section]))?;
        match raw.as_str() {
            Some(raw) => Ok(self.resolve(raw)),
            None => Err(StoreError::TypeMismatch {
                path: format!("{section}.{engine}"),
                expected: "string",
                found: raw.type_name(),
            }),
        }
    }

    fn path_at(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.config.get_str(key).map(|raw| self.resolve(raw))
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn load_config(path: &Path) -> Result<Node> {
    if !path.exists() {
        info!("{} not found, creating", path.display());
        default_config()
            .save(path)
            .with_context(|| format!("write default config to {path:?}"))?;
    }
    Node::from_path(path).with_context(|| format!("load config {path:?}"))
}
