use super::agent::{NamedAgent, ResolvedAgent};
use crate::error::FactoryError;
use agentry_schema::FactoryParams;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A callable that builds an agent from named params.
pub type AgentFactory =
    Arc<dyn Fn(&FactoryParams) -> Result<ResolvedAgent, FactoryError> + Send + Sync>;

/// Runs once per module on first import; the result is cached by the resolver.
pub type ModuleLoader = Arc<dyn Fn() -> Result<Arc<dyn FactoryModule>, String> + Send + Sync>;

/// An imported module exposing factory functions by name.
pub trait FactoryModule: Send + Sync {
    fn name(&self) -> &str;

    fn function(&self, name: &str) -> Option<AgentFactory>;
}

/// `FactoryModule` backed by a name -> factory map.
pub struct FunctionTable {
    name: String,
    functions: HashMap<String, AgentFactory>,
}

impl FunctionTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
        }
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&FactoryParams) -> Result<ResolvedAgent, FactoryError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(factory));
        self
    }
}

impl FactoryModule for FunctionTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self, name: &str) -> Option<AgentFactory> {
        self.functions.get(name).cloned()
    }
}

/// Modules compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinModule {
    Echo,
    Static,
}

impl BuiltinModule {
    pub const ALL: [BuiltinModule; 2] = [BuiltinModule::Echo, BuiltinModule::Static];

    pub fn module_name(self) -> &'static str {
        match self {
            BuiltinModule::Echo => "agentry.builtin.echo",
            BuiltinModule::Static => "agentry.builtin.static",
        }
    }

    pub fn from_module_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.module_name() == name)
    }

    fn load(self) -> Arc<dyn FactoryModule> {
        let table = match self {
            BuiltinModule::Echo => FunctionTable::new(self.module_name())
                .with_function("create_echo_agent", create_echo_agent),
            BuiltinModule::Static => FunctionTable::new(self.module_name())
                .with_function("create_agent", create_static_agent),
        };
        Arc::new(table)
    }
}

fn str_param<'a>(params: &'a FactoryParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn create_echo_agent(params: &FactoryParams) -> Result<ResolvedAgent, FactoryError> {
    let name = str_param(params, "name").unwrap_or("EchoAgent");
    let agent = NamedAgent::new(name, "Repeats the query back to the caller.")
        .with_params(params.clone());
    Ok(Box::new(agent))
}

fn create_static_agent(params: &FactoryParams) -> Result<ResolvedAgent, FactoryError> {
    let name = str_param(params, "name")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| FactoryError::Construction {
            agent_type: "static".to_string(),
            message: "param 'name' must be a non-empty string".to_string(),
        })?;
    let description = str_param(params, "description").unwrap_or_default();
    Ok(Box::new(
        NamedAgent::new(name, description).with_params(params.clone()),
    ))
}

/// Maps module names to loaders.
#[derive(Default)]
pub struct ModuleCatalog {
    loaders: RwLock<HashMap<String, ModuleLoader>>,
}

impl ModuleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every `BuiltinModule` registered.
    pub fn with_builtins() -> Self {
        let catalog = Self::empty();
        for module in BuiltinModule::ALL {
            catalog.register_module(module.module_name(), move || Ok(module.load()));
        }
        catalog
    }

    /// Registers (or replaces) the loader for `name`.
    pub fn register_module<F>(&self, name: impl Into<String>, loader: F)
    where
        F: Fn() -> Result<Arc<dyn FactoryModule>, String> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(module = %name, "module loader registered");
        self.loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(loader));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of every importable module, builtins included.
    pub fn module_names(&self) -> BTreeSet<String> {
        self.loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Runs the loader for `name`. Callers cache the result.
    pub(crate) fn import(&self, name: &str) -> Result<Arc<dyn FactoryModule>, FactoryError> {
        let loader = self
            .loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| FactoryError::ModuleNotFound {
                module: name.to_string(),
            })?;

        loader().map_err(|message| FactoryError::ModuleLoad {
            module: name.to_string(),
            message,
        })
    }
}
