use super::agent::ResolvedAgent;
use super::catalog::{AgentFactory, FactoryModule, ModuleCatalog};
use crate::error::FactoryError;
use agentry_schema::{AgentConfig, AgentRecord, FactoryParams};
use moka::sync::Cache;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

const MODULE_CACHE_CAPACITY: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_modules: u64,
    pub registered_factories: usize,
}

/// Turns an `AgentConfig` into a live agent.
///
/// Lookup order: the override table keyed by `agent_type`, then the module catalog via
/// `factory_module` / `factory_function`. Imported modules are cached; a concurrent first
/// import of the same module runs its loader once.
pub struct FactoryResolver {
    overrides: RwLock<HashMap<String, AgentFactory>>,
    catalog: ModuleCatalog,
    modules: Cache<String, Arc<dyn FactoryModule>>,
}

impl Default for FactoryResolver {
    fn default() -> Self {
        Self::new(ModuleCatalog::with_builtins())
    }
}

impl FactoryResolver {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            catalog,
            modules: Cache::builder()
                .max_capacity(MODULE_CACHE_CAPACITY)
                .build(),
        }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Registers an override for `agent_type`; the last registration wins.
    pub fn register_factory<F>(&self, agent_type: impl Into<String>, factory: F)
    where
        F: Fn(&FactoryParams) -> Result<ResolvedAgent, FactoryError> + Send + Sync + 'static,
    {
        let agent_type = agent_type.into();
        info!(agent_type = %agent_type, "factory override registered");
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_type, Arc::new(factory));
    }

    pub fn list_available_factories(&self) -> BTreeSet<String> {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.modules.run_pending_tasks();
        CacheStats {
            cached_modules: self.modules.entry_count(),
            registered_factories: self
                .overrides
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    pub fn create_agent(&self, config: &AgentConfig) -> Result<ResolvedAgent, FactoryError> {
        let override_factory = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&config.agent_type)
            .cloned();
        if let Some(factory) = override_factory {
            debug!(agent_type = %config.agent_type, "resolving through override");
            return factory(&config.factory_params);
        }

        let (module_name, function_name) =
            match (&config.factory_module, &config.factory_function) {
                (Some(m), Some(f)) if config.missing_keys().is_empty() => (m.as_str(), f.as_str()),
                _ => {
                    return Err(FactoryError::Config {
                        agent_type: config.agent_type.clone(),
                        missing: config.missing_keys(),
                    });
                }
            };

        let module = self.module(module_name)?;
        let factory = module
            .function(function_name)
            .ok_or_else(|| FactoryError::FunctionNotFound {
                module: module_name.to_string(),
                function: function_name.to_string(),
            })?;

        debug!(
            agent_type = %config.agent_type,
            module = module_name,
            function = function_name,
            "resolving through module catalog"
        );
        factory(&config.factory_params)
    }

    /// Resolves a registry record; disabled records are refused.
    pub fn resolve_record(&self, record: &AgentRecord) -> Result<ResolvedAgent, FactoryError> {
        if !record.enabled {
            return Err(FactoryError::Disabled {
                name: record.name.clone(),
            });
        }
        self.create_agent(&record.to_config())
    }

    fn module(&self, name: &str) -> Result<Arc<dyn FactoryModule>, FactoryError> {
        self.modules
            .try_get_with_by_ref(name, || -> Result<_, FactoryError> {
                let module = self.catalog.import(name)?;
                info!(module = name, "factory module imported");
                Ok(module)
            })
            .map_err(|e: Arc<FactoryError>| (*e).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::agent::NamedAgent;
    use crate::factory::catalog::{BuiltinModule, FunctionTable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_catalog(loads: Arc<AtomicUsize>) -> ModuleCatalog {
        let catalog = ModuleCatalog::empty();
        catalog.register_module("support.agents", move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FunctionTable::new("support.agents").with_function(
                "create_support_agent",
                |_: &FactoryParams| Ok(Box::new(NamedAgent::new("SupportAgent", "")) as ResolvedAgent),
            )) as Arc<dyn FactoryModule>)
        });
        catalog
    }

    #[test]
    fn type_only_config_lists_both_missing_keys() {
        let resolver = FactoryResolver::default();
        let err = resolver.create_agent(&AgentConfig::new("x")).unwrap_err();
        assert_eq!(
            err,
            FactoryError::Config {
                agent_type: "x".to_string(),
                missing: vec!["factory_module", "factory_function"],
            }
        );
    }

    #[test]
    fn override_ignores_module_and_function() {
        let resolver = FactoryResolver::new(ModuleCatalog::empty());
        resolver.register_factory("tickets", |_: &FactoryParams| {
            Ok(Box::new(NamedAgent::new("TicketsAgent", "")) as ResolvedAgent)
        });

        let cfg = AgentConfig::new("tickets")
            .with_module("unused")
            .with_function("unused");
        let agent = resolver.create_agent(&cfg).unwrap();
        assert_eq!(agent.name(), "TicketsAgent");
        assert_eq!(
            resolver.list_available_factories(),
            BTreeSet::from(["tickets".to_string()])
        );
    }

    #[test]
    fn module_is_imported_once_and_cached() {
        let loads = Arc::new(AtomicUsize::new(0));
        let resolver = FactoryResolver::new(counting_catalog(loads.clone()));
        let cfg = AgentConfig::new("support")
            .with_module("support.agents")
            .with_function("create_support_agent");

        resolver.create_agent(&cfg).unwrap();
        resolver.create_agent(&cfg).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            resolver.cache_stats(),
            CacheStats {
                cached_modules: 1,
                registered_factories: 0
            }
        );
    }

    #[test]
    fn concurrent_first_import_runs_loader_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let resolver = FactoryResolver::new(counting_catalog(loads.clone()));
        let cfg = AgentConfig::new("support")
            .with_module("support.agents")
            .with_function("create_support_agent");

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| resolver.create_agent(&cfg).unwrap());
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn module_and_function_failures_are_distinct() {
        let resolver = FactoryResolver::default();

        let missing_module = AgentConfig::new("a")
            .with_module("no.such.module")
            .with_function("f");
        let err = resolver.create_agent(&missing_module).unwrap_err();
        assert!(matches!(err, FactoryError::ModuleNotFound { .. }));

        let missing_fn = AgentConfig::new("a")
            .with_module(BuiltinModule::Echo.module_name())
            .with_function("no_such_fn");
        let err = resolver.create_agent(&missing_fn).unwrap_err();
        assert_eq!(
            err,
            FactoryError::FunctionNotFound {
                module: "agentry.builtin.echo".to_string(),
                function: "no_such_fn".to_string(),
            }
        );
    }

    #[test]
    fn failed_import_is_not_cached() {
        let resolver = FactoryResolver::new(ModuleCatalog::empty());
        let cfg = AgentConfig::new("late")
            .with_module("late.module")
            .with_function("build");
        assert!(resolver.create_agent(&cfg).is_err());

        resolver.catalog().register_module("late.module", || {
            Ok(Arc::new(FunctionTable::new("late.module").with_function(
                "build",
                |_: &FactoryParams| Ok(Box::new(NamedAgent::new("Late", "")) as ResolvedAgent),
            )) as Arc<dyn FactoryModule>)
        });
        assert_eq!(resolver.create_agent(&cfg).unwrap().name(), "Late");
    }

    #[test]
    fn disabled_record_is_refused() {
        let resolver = FactoryResolver::default();
        let mut record = AgentRecord::new(
            "echo",
            "",
            AgentConfig::new("echo")
                .with_module(BuiltinModule::Echo.module_name())
                .with_function("create_echo_agent")
                .into(),
        );
        assert_eq!(resolver.resolve_record(&record).unwrap().name(), "EchoAgent");

        record.enabled = false;
        let err = resolver.resolve_record(&record).unwrap_err();
        assert!(err.is_config());
    }
}
