use crate::agent_config::{AgentConfig, FactoryParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Persisted registry document: `{version, agents: {name: record}}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegistrySnapshot {
    pub version: String,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRecord>,
    /// Top-level fields this version does not model; written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistrySnapshot {
    pub const CURRENT_VERSION: &'static str = "1.0";
    pub const SUPPORTED_VERSIONS: &'static [&'static str] = &["1.0"];

    pub fn empty() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            agents: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn is_supported_version(version: &str) -> bool {
        Self::SUPPORTED_VERSIONS.contains(&version)
    }

    pub fn get(&self, name: &str) -> Option<&AgentRecord> {
        self.agents.get(name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values().filter(|r| r.enabled)
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AgentRecord {
    /// Mirrors the map key; documents may leave it empty and let the key stand in.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub factory_reference: FactoryReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Per-agent fields this version does not model; written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        factory_reference: FactoryReference,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: true,
            factory_reference,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn to_config(&self) -> AgentConfig {
        AgentConfig::from(&self.factory_reference)
    }
}

fn default_enabled() -> bool {
    true
}

/// Where and how to build an agent; persisted form of [`AgentConfig`].
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct FactoryReference {
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_function: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub factory_params: FactoryParams,
}

impl From<&FactoryReference> for AgentConfig {
    fn from(reference: &FactoryReference) -> Self {
        AgentConfig {
            agent_type: reference.agent_type.clone(),
            factory_module: reference.factory_module.clone(),
            factory_function: reference.factory_function.clone(),
            factory_params: reference.factory_params.clone(),
        }
    }
}

impl From<AgentConfig> for FactoryReference {
    fn from(config: AgentConfig) -> Self {
        FactoryReference {
            agent_type: config.agent_type,
            factory_module: config.factory_module,
            factory_function: config.factory_function,
            factory_params: config.factory_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_fills_defaults() {
        let raw = r#"{
            "version": "1.0",
            "agents": {
                "tickets": {
                    "description": "Ticket lookups",
                    "factory_reference": {"agent_type": "tickets"}
                }
            }
        }"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(raw).unwrap();
        let record = snapshot.get("tickets").unwrap();
        assert!(record.enabled);
        assert!(record.name.is_empty());
        assert_eq!(record.to_config().agent_type, "tickets");
        assert_eq!(snapshot.enabled().count(), 1);
    }

    #[test]
    fn missing_factory_reference_is_rejected() {
        let raw = r#"{"version":"1.0","agents":{"x":{"description":"no ref"}}}"#;
        assert!(serde_json::from_str::<RegistrySnapshot>(raw).is_err());
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let raw = r#"{
            "version": "1.0",
            "owner": "platform-team",
            "agents": {
                "billing": {
                    "factory_reference": {"agent_type": "billing"},
                    "tags": ["finance"],
                    "sla_ms": 250
                }
            }
        }"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.extra["owner"], "platform-team");
        let record = snapshot.get("billing").unwrap();
        assert_eq!(record.extra["sla_ms"], 250);

        let rewritten: Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(rewritten["owner"], "platform-team");
        assert_eq!(rewritten["agents"]["billing"]["tags"][0], "finance");
        assert_eq!(rewritten["agents"]["billing"]["sla_ms"], 250);
    }
}
