use crate::engine::{FileStorage, MemoryStorage, StorageEngine};
use crate::error::{PersistError, Result};
use crate::item::PersistItemBuilder;
use crate::slice::SliceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Persist item configuration, loadable from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    pub key: String,
    #[serde(default)]
    pub version: u32,
    /// Default slice expiry in milliseconds
    #[serde(default)]
    pub max_age_ms: Option<u64>,
    #[serde(default)]
    pub debounce_ms: u64,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub slices: Vec<SliceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceConfig {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub max_age_ms: Option<u64>,
}

/// Storage engine selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            key: "slicekeep".to_string(),
            version: 0,
            max_age_ms: None,
            debounce_ms: 0,
            engine: EngineConfig::default(),
            slices: Vec::new(),
        }
    }
}

impl PersistConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PersistError::InvalidConfig(format!("{:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PersistConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(PersistError::InvalidConfig(
                "key must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for slice in &self.slices {
            if slice.name.is_empty() {
                return Err(PersistError::InvalidConfig(
                    "slice name must not be empty".to_string(),
                ));
            }
            if !seen.insert(slice.name.as_str()) {
                return Err(PersistError::InvalidConfig(format!(
                    "slice '{}' declared twice",
                    slice.name
                )));
            }
        }

        Ok(())
    }

    /// Build the configured storage engine
    ///
    /// A memory engine is private to the returned handle.
    pub fn open_engine(&self) -> Arc<dyn StorageEngine> {
        match &self.engine {
            EngineConfig::Memory => Arc::new(MemoryStorage::new()),
            EngineConfig::File { path } => Arc::new(FileStorage::new(path.clone())),
        }
    }

    pub fn descriptors(&self) -> Vec<SliceDescriptor> {
        self.slices
            .iter()
            .map(|slice| {
                let descriptor = SliceDescriptor::new(slice.name.clone()).version(slice.version);
                match slice.max_age_ms {
                    Some(ms) => descriptor.max_age(Duration::from_millis(ms)),
                    None => descriptor,
                }
            })
            .collect()
    }

    /// Item builder with every declared slice (JSON codec, no decoder)
    pub fn builder(&self, engine: Arc<dyn StorageEngine>) -> PersistItemBuilder {
        let builder = PersistItemBuilder::new(self.key.clone(), engine)
            .version(self.version)
            .debounce(Duration::from_millis(self.debounce_ms))
            .slices(self.descriptors());

        match self.max_age_ms {
            Some(ms) => builder.max_age(Duration::from_millis(ms)),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
key: app-state
version: 3
max_age_ms: 86400000
debounce_ms: 25
engine:
  type: file
  path: ./data/state
slices:
  - name: counter
  - name: session
    version: 2
    max_age_ms: 60000
"#;

    #[test]
    fn test_parse_yaml() {
        let config = PersistConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.key, "app-state");
        assert_eq!(config.version, 3);
        assert_eq!(config.max_age_ms, Some(86_400_000));
        assert_eq!(config.debounce_ms, 25);
        assert_eq!(
            config.engine,
            EngineConfig::File {
                path: PathBuf::from("./data/state")
            }
        );

        let descriptors = config.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].expected_version(), 0);
        assert_eq!(descriptors[0].max_age_override(), None);
        assert_eq!(descriptors[1].expected_version(), 2);
        assert_eq!(
            descriptors[1].max_age_override(),
            Some(Duration::from_millis(60_000))
        );
    }

    #[test]
    fn test_defaults() {
        let config = PersistConfig::from_yaml("key: minimal").unwrap();
        assert_eq!(config.version, 0);
        assert_eq!(config.engine, EngineConfig::Memory);
        assert!(config.slices.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_slices() {
        let yaml = "key: k\nslices:\n  - name: a\n  - name: a\n";
        assert!(matches!(
            PersistConfig::from_yaml(yaml),
            Err(PersistError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_empty_key_and_bad_yaml() {
        assert!(PersistConfig::from_yaml("key: ''").is_err());
        assert!(PersistConfig::from_yaml("key: [unclosed").is_err());
    }

    #[test]
    fn test_builder_builds_item() {
        let config = PersistConfig::from_yaml(SAMPLE).unwrap();
        let item = config
            .builder(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap();

        assert_eq!(item.key(), "app-state");
        assert_eq!(item.version(), 3);
        assert_eq!(
            item.slice_names().collect::<Vec<_>>(),
            vec!["counter", "session"]
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = PersistConfig::from_file(&path).unwrap();
        assert_eq!(config.slices.len(), 2);

        assert!(matches!(
            PersistConfig::from_file(dir.path().join("missing.yml")),
            Err(PersistError::InvalidConfig(_))
        ));
    }
}
