//! Module lifecycle
//!
//! A module is a unit loaded into the host process. Startup may register node
//! classes into a registry; shutdown removes what startup added. Modules are
//! started in the configured order and stopped in reverse, and no module may
//! rely on another module's registrations.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{ConfigError, EngineConfig};
use crate::errors::EngineResult;
use crate::interface::NodeClassKey;
use crate::nodes;
use crate::parameters::DescriptorError;
use crate::registry::{NodeFactory, NodeRegistry};

pub trait SoundModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once after the module is loaded.
    fn startup(&mut self, registry: &NodeRegistry) -> EngineResult<()>;

    /// Called before the module is unloaded. Must undo `startup`.
    fn shutdown(&mut self, registry: &NodeRegistry);
}

/// Sound module without node classes. Its hooks only log.
#[derive(Debug, Default)]
pub struct OrpheusSoundModule;

impl SoundModule for OrpheusSoundModule {
    fn name(&self) -> &'static str {
        "OrpheusSound"
    }

    fn startup(&mut self, _registry: &NodeRegistry) -> EngineResult<()> {
        info!(module = self.name(), "Module started");
        Ok(())
    }

    fn shutdown(&mut self, _registry: &NodeRegistry) {
        info!(module = self.name(), "Module shut down");
    }
}

/// Node classes a module registers at startup.
pub type FactoryList = fn() -> Result<Vec<NodeFactory>, DescriptorError>;

/// Registers the built-in node classes.
#[derive(Debug)]
pub struct NodeExtModule {
    factories: FactoryList,
    registered: Vec<NodeClassKey>,
}

impl Default for NodeExtModule {
    fn default() -> Self {
        Self::with_factories(nodes::builtin_factories)
    }
}

impl NodeExtModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factories(factories: FactoryList) -> Self {
        Self {
            factories,
            registered: Vec::new(),
        }
    }

    pub fn registered(&self) -> &[NodeClassKey] {
        &self.registered
    }

    fn unregister_all(&mut self, registry: &NodeRegistry) {
        for key in self.registered.drain(..).rev() {
            registry.unregister(&key);
        }
    }
}

impl SoundModule for NodeExtModule {
    fn name(&self) -> &'static str {
        "NodeExt"
    }

    fn startup(&mut self, registry: &NodeRegistry) -> EngineResult<()> {
        let factories = (self.factories)()?;

        for factory in factories {
            match registry.register(factory) {
                Ok(key) => self.registered.push(key),
                Err(e) => {
                    // Leave the registry as it was before startup.
                    self.unregister_all(registry);
                    return Err(e.into());
                }
            }
        }

        info!(module = self.name(), classes = self.registered.len(), "Module started");
        Ok(())
    }

    fn shutdown(&mut self, registry: &NodeRegistry) {
        self.unregister_all(registry);
        info!(module = self.name(), "Module shut down");
    }
}

/// Resolve a module by the name used in configuration files.
pub fn module_by_name(name: &str) -> Result<Box<dyn SoundModule>, ConfigError> {
    match name {
        "OrpheusSound" => Ok(Box::new(OrpheusSoundModule)),
        "NodeExt" => Ok(Box::new(NodeExtModule::new())),
        _ => Err(ConfigError::UnknownModule {
            name: name.to_string(),
        }),
    }
}

/// Starts and stops an ordered set of modules against one registry.
pub struct ModuleManager {
    registry: Arc<NodeRegistry>,
    modules: Vec<Box<dyn SoundModule>>,
    started: usize,
}

impl ModuleManager {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            modules: Vec::new(),
            started: 0,
        }
    }

    pub fn with_default_modules(registry: Arc<NodeRegistry>) -> Self {
        let mut manager = Self::new(registry);
        manager.add_module(Box::new(OrpheusSoundModule));
        manager.add_module(Box::new(NodeExtModule::new()));
        manager
    }

    pub fn from_config(config: &EngineConfig, registry: Arc<NodeRegistry>) -> Result<Self, ConfigError> {
        let mut manager = Self::new(registry);
        for name in &config.modules {
            manager.add_module(module_by_name(name)?);
        }
        Ok(manager)
    }

    pub fn add_module(&mut self, module: Box<dyn SoundModule>) {
        self.modules.push(module);
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started > 0
    }

    /// Start every module in order. On failure the modules already started are shut down again.
    pub fn startup_all(&mut self) -> EngineResult<()> {
        while self.started < self.modules.len() {
            let module = &mut self.modules[self.started];
            if let Err(e) = module.startup(&self.registry) {
                error!(module = module.name(), "Module startup failed: {}", e);
                self.shutdown_all();
                return Err(e);
            }
            self.started += 1;
        }
        Ok(())
    }

    /// Shut down started modules in reverse order.
    pub fn shutdown_all(&mut self) {
        while self.started > 0 {
            self.started -= 1;
            self.modules[self.started].shutdown(&self.registry);
        }
    }
}
