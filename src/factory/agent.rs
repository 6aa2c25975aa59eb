use agentry_schema::FactoryParams;
use serde_json::Value;
use std::fmt;

/// A live agent instance produced by a factory.
pub trait Agent: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }
}

/// Ownership of the constructed agent moves to the caller.
pub type ResolvedAgent = Box<dyn Agent>;

/// Plain agent carrying a name, a description and the params it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedAgent {
    name: String,
    description: String,
    params: FactoryParams,
}

impl NamedAgent {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: FactoryParams::new(),
        }
    }

    pub fn with_params(mut self, params: FactoryParams) -> Self {
        self.params = params;
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

impl Agent for NamedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }
}
