//! Runner configuration documents.
//!
//! The access-control, sources and resources documents are read from disk
//! into an immutable [`ConfigBundle`]. Requests take a snapshot of the current
//! bundle once and keep it for their whole lifetime. A reload builds a new
//! bundle and swaps the shared reference; requests already in flight finish
//! with the bundle they started with.
//!
//! Documents are read with `tokio::fs`, so loading never blocks a runtime
//! worker thread.

use crate::config::DocumentsConfig;
use crate::errors::ConfigError;
use parking_lot::RwLock;
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
pub struct ConfigBundle {
    /// Raw YAML, forwarded to the runner as-is.
    pub acl: String,
    pub sources: String,
    pub resources: String,
    pub plugins_module: String,
    /// Establishments per project, in document order.
    establishments: HashMap<String, Vec<String>>,
}

impl ConfigBundle {
    pub fn from_documents(
        acl: String,
        sources: String,
        resources: String,
        plugins_module: String,
    ) -> Result<Self, ConfigError> {
        serde_yaml::from_str::<YamlValue>(&acl)?;
        serde_yaml::from_str::<YamlValue>(&resources)?;
        let establishments = parse_establishments(&sources)?;

        Ok(Self {
            acl,
            sources,
            resources,
            plugins_module,
            establishments,
        })
    }

    pub async fn load(documents: &DocumentsConfig) -> Result<Self, ConfigError> {
        let (acl, sources, resources) = tokio::try_join!(
            read(&documents.acl),
            read(&documents.sources),
            read(&documents.resources),
        )?;
        Self::from_documents(acl, sources, resources, documents.plugins_module.clone())
    }

    /// Establishments configured for `project`, or an empty slice for unknown projects.
    pub fn establishments(&self, project: &str) -> &[String] {
        self.establishments
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

async fn read(path: &Path) -> Result<String, ConfigError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

// Expected layout:
//
// project:
//   sources:
//     establishment:
//       plugins: ...
fn parse_establishments(sources: &str) -> Result<HashMap<String, Vec<String>>, ConfigError> {
    let projects: Option<Mapping> = serde_yaml::from_str(sources)?;

    let mut establishments = HashMap::new();
    for (project, body) in projects.unwrap_or_default() {
        let project = yaml_key(&project)?;
        let names = match body.get("sources") {
            Some(YamlValue::Mapping(sources)) => sources
                .keys()
                .map(yaml_key)
                .collect::<Result<Vec<_>, _>>()?,
            Some(YamlValue::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ConfigError::Invalid(format!(
                    "sources of project {project} must be a mapping"
                )));
            }
        };
        establishments.insert(project, names);
    }

    Ok(establishments)
}

fn yaml_key(key: &YamlValue) -> Result<String, ConfigError> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        other => Err(ConfigError::Invalid(format!(
            "expected a string key, found {other:?}"
        ))),
    }
}

/// Holds the current configuration snapshot.
///
/// The first snapshot is loaded lazily so that a missing document fails the
/// requests that need it instead of the whole process.
pub struct ConfigStore {
    documents: DocumentsConfig,
    current: RwLock<Option<Arc<ConfigBundle>>>,
}

impl ConfigStore {
    pub fn new(documents: DocumentsConfig) -> Self {
        Self {
            documents,
            current: RwLock::new(None),
        }
    }

    /// Builds a store around an already loaded bundle.
    pub fn with_bundle(documents: DocumentsConfig, bundle: ConfigBundle) -> Self {
        Self {
            documents,
            current: RwLock::new(Some(Arc::new(bundle))),
        }
    }

    pub async fn snapshot(&self) -> Result<Arc<ConfigBundle>, ConfigError> {
        let current = self.current.read().clone();
        if let Some(bundle) = current {
            return Ok(bundle);
        }

        let loaded = Arc::new(ConfigBundle::load(&self.documents).await?);
        let mut current = self.current.write();
        // Another request may have loaded it while we were reading the files
        Ok(current.get_or_insert(loaded).clone())
    }

    /// Loads the documents again and swaps them in. On failure the previous
    /// snapshot stays active.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let loaded = Arc::new(ConfigBundle::load(&self.documents).await?);
        *self.current.write() = Some(loaded);
        tracing::info!("configuration documents reloaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ACL: &str = r#"
proj:
    myetab:
        members:
            - method1
"#;

    const SOURCES: &str = r#"
proj:
    sources:
        myetab:
            plugins:
                Ldapuds:
                    - spore: http://myurl/description.json
        myetab2:
            plugins:
                Bnu:
                    - spore: http://myurl/description.json
        2024:
            plugins: {}
other:
    sources:
"#;

    const RESOURCES: &str = r#"
members:
    method1:
        request method: GET
"#;

    fn write_tmp_file(dir: &tempfile::TempDir, name: &str, s: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", s).unwrap();
        path
    }

    fn documents(dir: &tempfile::TempDir) -> DocumentsConfig {
        DocumentsConfig {
            acl: write_tmp_file(dir, "acl.yaml", ACL),
            sources: write_tmp_file(dir, "sources.yaml", SOURCES),
            resources: write_tmp_file(dir, "resources.yaml", RESOURCES),
            plugins_module: "plugins".into(),
        }
    }

    #[test]
    fn test_establishments() {
        let bundle = ConfigBundle::from_documents(
            ACL.into(),
            SOURCES.into(),
            RESOURCES.into(),
            "plugins".into(),
        )
        .unwrap();

        assert_eq!(bundle.establishments("proj"), ["myetab", "myetab2", "2024"]);
        assert!(bundle.establishments("other").is_empty());
        assert!(bundle.establishments("unknown").is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        let invalid_yaml = ConfigBundle::from_documents(
            "proj: [unclosed".into(),
            SOURCES.into(),
            RESOURCES.into(),
            "plugins".into(),
        );
        assert!(matches!(invalid_yaml, Err(ConfigError::Parse(_))));

        let invalid_sources = ConfigBundle::from_documents(
            ACL.into(),
            "proj:\n    sources: [a, b]\n".into(),
            RESOURCES.into(),
            "plugins".into(),
        );
        assert!(matches!(invalid_sources, Err(ConfigError::Invalid(_))));

        let empty = ConfigBundle::from_documents(
            String::new(),
            String::new(),
            String::new(),
            "plugins".into(),
        )
        .unwrap();
        assert!(empty.establishments("proj").is_empty());
    }

    #[tokio::test]
    async fn test_store_loads_lazily_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let documents = documents(&dir);
        let store = ConfigStore::new(documents.clone());
        assert!(!store.is_loaded());

        let first = store.snapshot().await.unwrap();
        assert!(store.is_loaded());
        assert_eq!(first.establishments("proj").len(), 3);
        assert!(Arc::ptr_eq(&first, &store.snapshot().await.unwrap()));

        write_tmp_file(&dir, "sources.yaml", "proj:\n    sources:\n        only: {}\n");
        store.reload().await.unwrap();

        let second = store.snapshot().await.unwrap();
        assert_eq!(second.establishments("proj"), ["only"]);
        // Snapshots taken before the reload are unaffected
        assert_eq!(first.establishments("proj").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(documents(&dir));
        store.snapshot().await.unwrap();

        std::fs::remove_file(dir.path().join("acl.yaml")).unwrap();
        assert!(matches!(store.reload().await, Err(ConfigError::Io { .. })));
        assert_eq!(
            store.snapshot().await.unwrap().establishments("proj").len(),
            3
        );
    }

    #[tokio::test]
    async fn test_missing_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut documents = documents(&dir);
        documents.resources = dir.path().join("missing.yaml");

        let store = ConfigStore::new(documents);
        assert!(matches!(store.snapshot().await, Err(ConfigError::Io { .. })));
        assert!(!store.is_loaded());
    }
}
