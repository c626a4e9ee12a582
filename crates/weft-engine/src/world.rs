//! World and plugin descriptions, and system loading.
//!
//! A [`WorldDescription`] names a world and lists the plugins it declares.
//! Parsing those descriptions from disk is the host's job; this module
//! only carries the parsed form. Each declared plugin is handed to a
//! [`SystemLoader`], which either instantiates an opaque [`System`] or
//! declines. Declined plugins are skipped, never fatal.

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::warn;

/// Opaque handle to an instantiated per-world system plugin.
pub trait System: Send + Sync {
    /// Diagnostic name.
    fn name(&self) -> &str;
}

/// Systems loaded for one world, in declaration order.
pub type Systems = SmallVec<[Box<dyn System>; 4]>;

/// One `<plugin>` element of a world description.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PluginDescription {
    /// Plugin instance name.
    pub name: String,
    /// Library or registry key the loader resolves.
    pub filename: String,
    /// Free-form parameters, in declaration order.
    pub parameters: IndexMap<String, String>,
}

impl PluginDescription {
    /// Describe a plugin with no parameters.
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            parameters: IndexMap::new(),
        }
    }

    /// Add a parameter, replacing any previous value for `key`.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// A parsed world: its name and the plugins it declares.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldDescription {
    /// World name, unique within one orchestrator.
    pub name: String,
    /// Declared plugins, in document order.
    pub plugins: Vec<PluginDescription>,
}

impl WorldDescription {
    /// Describe a world with no plugins.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugins: Vec::new(),
        }
    }

    /// Append a plugin declaration.
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// Instantiates system plugins from their descriptions.
pub trait SystemLoader {
    /// Instantiate `plugin`, or return `None` if it cannot be loaded.
    fn load(&self, plugin: &PluginDescription) -> Option<Box<dyn System>>;
}

impl<F> SystemLoader for F
where
    F: Fn(&PluginDescription) -> Option<Box<dyn System>>,
{
    fn load(&self, plugin: &PluginDescription) -> Option<Box<dyn System>> {
        self(plugin)
    }
}

/// Load every plugin `world` declares, skipping the ones `loader` declines.
pub fn load_systems(world: &WorldDescription, loader: &dyn SystemLoader) -> Systems {
    let mut systems = Systems::new();
    for plugin in &world.plugins {
        match loader.load(plugin) {
            Some(system) => systems.push(system),
            None => warn!(
                world = %world.name,
                plugin = %plugin.name,
                filename = %plugin.filename,
                "failed to load system plugin, skipping"
            ),
        }
    }
    systems
}
