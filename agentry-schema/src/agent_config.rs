use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named arguments handed to an agent factory.
pub type FactoryParams = Map<String, Value>;

/// Transient construction request for one agent.
///
/// `factory_module` and `factory_function` are optional at the type level so that a
/// request missing either can still be represented and rejected with every missing key
/// named at once.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct AgentConfig {
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_function: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub factory_params: FactoryParams,
}

impl AgentConfig {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            ..Default::default()
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.factory_module = Some(module.into());
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.factory_function = Some(function.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.factory_params.insert(key.into(), value.into());
        self
    }

    /// Keys required by the catalog path that are absent or blank, in declaration order.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.factory_module) {
            missing.push("factory_module");
        }
        if blank(&self.factory_function) {
            missing.push("factory_function");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_lists_both_when_only_type_given() {
        let cfg: AgentConfig = serde_json::from_str(r#"{"agent_type":"x"}"#).unwrap();
        assert_eq!(cfg.missing_keys(), vec!["factory_module", "factory_function"]);
    }

    #[test]
    fn blank_module_counts_as_missing() {
        let cfg = AgentConfig::new("x").with_module("  ").with_function("build");
        assert_eq!(cfg.missing_keys(), vec!["factory_module"]);
    }

    #[test]
    fn params_are_omitted_when_empty() {
        let cfg = AgentConfig::new("x").with_module("m").with_function("f");
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(
            json,
            r#"{"agent_type":"x","factory_module":"m","factory_function":"f"}"#
        );
    }
}
