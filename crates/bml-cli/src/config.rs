use bml_ordering::EngineConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const COLLECTION_ENV: &str = "BML_COLLECTION";
const DEFAULT_COLLECTION: &str = "default";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BmlConfig {
    pub global: Option<BmlGlobal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BmlGlobal {
    pub default_collection: Option<String>,
    pub store_path: Option<PathBuf>,
    pub call_timeout_ms: Option<u64>,
    pub max_in_flight: Option<usize>,
}

pub struct BmlPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    pub locks_dir: PathBuf,
}

impl BmlPaths {
    pub fn new(root: PathBuf) -> Self {
        let bml_dir = root.join(".bml");
        Self {
            config_path: bml_dir.join("config.json"),
            store_path: bml_dir.join("store.json"),
            locks_dir: bml_dir.join("locks"),
            root,
        }
    }
}

pub struct BmlContext {
    pub paths: BmlPaths,
    pub config: Option<BmlConfig>,
}

impl BmlContext {
    pub fn new(root: PathBuf) -> Self {
        let paths = BmlPaths::new(root);
        let config = load_config(&paths.config_path, dirs::home_dir().as_deref());
        Self { paths, config }
    }

    fn global(&self) -> Option<&BmlGlobal> {
        self.config.as_ref()?.global.as_ref()
    }

    pub fn resolve_collection(&self, override_collection: Option<&str>) -> String {
        self.resolve_collection_with(override_collection, std::env::var(COLLECTION_ENV).ok())
    }

    fn resolve_collection_with(
        &self,
        override_collection: Option<&str>,
        env_collection: Option<String>,
    ) -> String {
        if let Some(collection) = override_collection {
            if !collection.trim().is_empty() {
                return collection.trim().to_string();
            }
        }
        if let Some(collection) = env_collection {
            if !collection.trim().is_empty() {
                return collection.trim().to_string();
            }
        }
        if let Some(collection) = self.global().and_then(|g| g.default_collection.as_ref()) {
            if !collection.trim().is_empty() {
                return collection.trim().to_string();
            }
        }
        DEFAULT_COLLECTION.to_string()
    }

    pub fn resolve_store_path(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        if let Some(path) = self.global().and_then(|g| g.store_path.as_ref()) {
            if path.is_absolute() {
                return path.clone();
            }
            return self.paths.root.join(path);
        }
        self.paths.store_path.clone()
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(global) = self.global() {
            if let Some(ms) = global.call_timeout_ms.filter(|ms| *ms > 0) {
                config.call_timeout = Duration::from_millis(ms);
            }
            if let Some(max) = global.max_in_flight.filter(|max| *max > 0) {
                config.max_in_flight = max;
            }
        }
        config
    }
}

fn load_config(project_path: &Path, home: Option<&Path>) -> Option<BmlConfig> {
    let mut candidates = Vec::new();
    if project_path.exists() {
        candidates.push(project_path.to_path_buf());
    } else if let Some(home) = home {
        candidates.push(home.join(".bml/config.json"));
    }

    for path in candidates {
        if let Ok(content) = fs::read_to_string(&path) {
            match serde_json::from_str::<BmlConfig>(&content) {
                Ok(config) => return Some(config),
                Err(err) => {
                    eprintln!("Warning: failed to parse {}: {}", path.display(), err);
                }
            }
        }
    }
    None
}
