//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Adapter identity and ordered registry."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::collections::HashSet;

use r_rcs_common::config::{AppConfig, ConfigError};

/// A named CAN-bus interface through which one rectifier device is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Adapter {
    id: String,
    description: Option<String>,
}

impl Adapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bus interface name, e.g. `can0`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl std::fmt::Display for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Ordered, duplicate-free set of adapters under management. Iteration order
/// is the declaration order from configuration and fixes the per-cycle
/// processing order.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Adapter>,
}

impl AdapterRegistry {
    /// Build a registry, rejecting an empty or duplicated adapter set.
    pub fn new(adapters: Vec<Adapter>) -> Result<Self, ConfigError> {
        if adapters.is_empty() {
            return Err(ConfigError::NoAdapters);
        }
        let mut seen = HashSet::new();
        for adapter in &adapters {
            if !seen.insert(adapter.id().to_owned()) {
                return Err(ConfigError::DuplicateAdapter(adapter.id().to_owned()));
            }
        }
        Ok(Self { adapters })
    }

    /// Build the registry from the adapter table of a loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let adapters = config
            .adapters
            .iter()
            .map(|(id, adapter_cfg)| {
                let mut adapter = Adapter::new(id);
                if let Some(description) = &adapter_cfg.description {
                    adapter = adapter.with_description(description);
                }
                adapter
            })
            .collect();
        Self::new(adapters)
    }

    /// Adapters in processing order.
    pub fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_declaration_order() {
        let registry = AdapterRegistry::new(vec![
            Adapter::new("can1"),
            Adapter::new("can0"),
            Adapter::new("can3"),
        ])
        .expect("valid registry");
        let ids: Vec<&str> = registry.adapters().iter().map(Adapter::id).collect();
        assert_eq!(ids, vec!["can1", "can0", "can3"]);
    }

    #[test]
    fn rejects_empty_set() {
        let err = AdapterRegistry::new(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoAdapters));
    }

    #[test]
    fn rejects_duplicates() {
        let err = AdapterRegistry::new(vec![Adapter::new("can0"), Adapter::new("can0")])
            .unwrap_err();
        match err {
            ConfigError::DuplicateAdapter(id) => assert_eq!(id, "can0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_config_keeps_table_order() {
        let config: AppConfig = r#"
            [adapters.can2]
            [adapters.can0]
            description = "rack A"
            [adapters.can1]
        "#
        .parse()
        .expect("config");
        let registry = AdapterRegistry::from_config(&config).expect("registry");
        let ids: Vec<&str> = registry.adapters().iter().map(Adapter::id).collect();
        assert_eq!(ids, vec!["can2", "can0", "can1"]);
        assert_eq!(registry.adapters()[1].description(), Some("rack A"));
    }
}
