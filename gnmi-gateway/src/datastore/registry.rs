//! Named datastore instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{Datastore, MemoryDatastore};
use crate::config::DatastoreConfig;
use crate::error::{GatewayError, Result};
use crate::flatten::flatten;

/// Datastore instances by name, built once at startup and handed to the
/// request handler.
#[derive(Default)]
pub struct DatastoreRegistry {
    stores: BTreeMap<String, Arc<dyn Datastore>>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build in-memory instances from configuration.
    pub fn from_config(configs: &BTreeMap<String, DatastoreConfig>) -> Self {
        let mut registry = Self::new();

        for (name, config) in configs {
            // Seed values are leaves or whole subtrees rooted at their path.
            let records = config
                .data
                .iter()
                .flat_map(|(path, value)| flatten(value, path));
            let store = MemoryDatastore::new(name.as_str(), config.modules.clone())
                .with_records(records);

            info!(
                datastore = %name,
                modules = config.modules.len(),
                leaves = config.data.len(),
                "Datastore instance ready"
            );
            registry.register(Arc::new(store));
        }

        registry
    }

    /// Add an instance, replacing any instance of the same name.
    pub fn register(&mut self, store: Arc<dyn Datastore>) {
        self.stores.insert(store.name().to_string(), store);
    }

    /// Look up an instance by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Datastore>> {
        self.stores.get(name).cloned().ok_or_else(|| {
            GatewayError::config(format!(
                "Unknown datastore '{}'. Available: {:?}",
                name,
                self.names()
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{SchemaModule, SessionKind};
    use crate::value::ValueRecord;

    #[test]
    fn test_from_config_seeds_data() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "running".to_string(),
            DatastoreConfig {
                modules: vec![SchemaModule::new("m", "2024-01-01")],
                data: [
                    ("/m/top/mtu".to_string(), serde_json::json!(1500)),
                    ("/m/top/name".to_string(), serde_json::json!("eth0")),
                ]
                .into_iter()
                .collect(),
            },
        );

        let registry = DatastoreRegistry::from_config(&configs);
        let store = registry.get("running").unwrap();
        let mut session = store.open_session(SessionKind::ReadOnly).unwrap();

        assert_eq!(
            session.read_batch(&["/m/top".to_string()]).unwrap(),
            vec![
                ValueRecord::with_value("/m/top/mtu", 1500i64),
                ValueRecord::with_value("/m/top/name", "eth0"),
            ]
        );
    }

    #[test]
    fn test_unknown_instance() {
        let mut registry = DatastoreRegistry::new();
        registry.register(Arc::new(MemoryDatastore::new("running", Vec::new())));

        assert_eq!(registry.names(), vec!["running"]);
        match registry.get("startup") {
            Err(GatewayError::Config(msg)) => assert!(msg.contains("startup")),
            Err(other) => panic!("expected config error, got {}", other),
            Ok(_) => panic!("expected config error"),
        }
    }
}
