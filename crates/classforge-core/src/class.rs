//! Class synthesis.
//!
//! A [`CatalogBuilder`] collects validated [`ClassConfig`]s, resolves
//! inheritance and produces an immutable [`Catalog`] of [`ClassDef`]s. Each
//! class definition holds the flattened, parent-first property list, the
//! ancestor tags used for instance checks, and the optional table binding
//! that enables the persistence methods. A [`ClassFactory`] creates
//! [`Instance`]s of one class.

use crate::config::{ClassConfig, IndexConfig, ParentRef, SchemaFile};
use crate::error::{ClassError, ConfigError, Result};
use crate::instance::{Instance, Seed};
use crate::property::{Property, IDENTITY};
use crate::registry::NOOP_HANDLER;
use crate::service::Fetch;
use crate::validate::validate_class;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default limit for nested-object loading.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Callback a function-kind property can name.
pub type Handler = Arc<dyn Fn(&Instance, &[Value]) -> Result<Value> + Send + Sync>;

/// Table binding of a persisted class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub name: String,
    pub alternate_lookup: Option<String>,
    /// Slot of the identity property.
    pub identity: usize,
}

/// Synthesized class.
#[derive(Debug)]
pub struct ClassDef {
    name: String,
    parent: Option<Arc<ClassDef>>,
    /// This class followed by its ancestors.
    lineage: Vec<String>,
    /// Slots of the properties this class declares, in declaration order.
    own: Vec<usize>,
    properties: Vec<Arc<Property>>,
    index: HashMap<String, usize>,
    table: Option<TableBinding>,
    indexes: Vec<IndexConfig>,
}

impl ClassDef {
    fn new(config: &ClassConfig, parent: Option<Arc<ClassDef>>) -> Result<Self, ConfigError> {
        let mut properties = parent
            .as_ref()
            .map(|parent| parent.properties.clone())
            .unwrap_or_default();
        let mut index = parent
            .as_ref()
            .map(|parent| parent.index.clone())
            .unwrap_or_default();

        let mut own = Vec::with_capacity(config.properties.len());
        for property_config in &config.properties {
            let property = Arc::new(Property::from_config(property_config)?);
            let slot = match index.get(&property.name) {
                Some(&slot) if own.contains(&slot) => {
                    return Err(ConfigError::DuplicateProperty {
                        class: config.class_name.clone(),
                        property: property.name.clone(),
                    })
                }
                // Overrides keep the inherited slot.
                Some(&slot) => {
                    properties[slot] = property;
                    slot
                }
                None => {
                    index.insert(property.name.clone(), properties.len());
                    properties.push(property);
                    properties.len() - 1
                }
            };
            own.push(slot);
        }

        let mut lineage = vec![config.class_name.clone()];
        if let Some(parent) = &parent {
            lineage.extend(parent.lineage.iter().cloned());
        }

        let table = match &config.table_name {
            Some(table) => {
                let identity = index
                    .get(IDENTITY)
                    .copied()
                    .filter(|&slot| properties[slot].kind().is_integer())
                    .ok_or_else(|| ConfigError::MissingIdentity {
                        class: config.class_name.clone(),
                    })?;
                if let Some(lookup) = &config.alternate_lookup {
                    if !index.contains_key(lookup) {
                        return Err(ConfigError::UnknownLookupProperty {
                            class: config.class_name.clone(),
                            property: lookup.clone(),
                        });
                    }
                }
                Some(TableBinding {
                    name: table.clone(),
                    alternate_lookup: config.alternate_lookup.clone(),
                    identity,
                })
            }
            None => None,
        };

        for index_config in &config.indexes {
            if let Some(column) = index_config
                .columns
                .iter()
                .find(|column| !index.contains_key(column.as_str()))
            {
                return Err(ConfigError::UnknownIndexColumn {
                    class: config.class_name.clone(),
                    index: index_config.name.clone(),
                    column: column.clone(),
                });
            }
        }

        Ok(Self {
            name: config.class_name.clone(),
            parent,
            lineage,
            own,
            properties,
            index,
            table,
            indexes: config.indexes.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ClassDef>> {
        self.parent.as_ref()
    }

    /// Class tag followed by every ancestor tag.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// True when `class` is this class or one of its ancestors.
    pub fn is_a(&self, class: &str) -> bool {
        self.lineage.iter().any(|name| name == class)
    }

    /// Every property, inherited ones first.
    pub fn properties(&self) -> &[Arc<Property>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Arc<Property>> {
        self.slot(name).map(|slot| &self.properties[slot])
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Slots this class declares itself, including overrides.
    pub fn own_slots(&self) -> &[usize] {
        &self.own
    }

    pub fn table(&self) -> Option<&TableBinding> {
        self.table.as_ref()
    }

    pub fn indexes(&self) -> &[IndexConfig] {
        &self.indexes
    }

    /// Names of persisted columns, parent-first.
    pub fn stored_columns(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|property| property.store)
            .map(|property| property.name.clone())
            .collect()
    }
}

/// Immutable collection of synthesized classes and registered handlers.
pub struct Catalog {
    classes: HashMap<String, Arc<ClassDef>>,
    order: Vec<String>,
    handlers: HashMap<String, Handler>,
    fetcher: Option<Arc<dyn Fetch>>,
    max_depth: usize,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Catalog")
            .field("classes", &self.order)
            .field("handlers", &handlers)
            .field("fetcher", &self.fetcher.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn class(&self, name: &str) -> Option<&Arc<ClassDef>> {
        self.classes.get(name)
    }

    /// Class names in registration order, parents before children.
    pub fn class_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Factory for the named class.
    pub fn factory(self: &Arc<Self>, name: &str) -> Result<ClassFactory> {
        let class = self
            .classes
            .get(name)
            .cloned()
            .ok_or_else(|| ClassError::UnknownClass(name.to_string()))?;
        Ok(ClassFactory {
            catalog: Arc::clone(self),
            class,
        })
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn fetcher(&self) -> Option<&Arc<dyn Fetch>> {
        self.fetcher.as_ref()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn warn_unknown_references(&self) {
        for class in self.classes.values() {
            for slot in class.own_slots() {
                let property = &class.properties()[*slot];
                if let Some(target) = property.class_constraint() {
                    if !self.classes.contains_key(target) {
                        warn!(
                            class = class.name(),
                            property = %property.name,
                            referenced = target,
                            "Property references a class missing from the catalog"
                        );
                    }
                }
            }
        }
    }

    fn check_defaults(self: &Arc<Self>) -> Result<(), ConfigError> {
        for name in &self.order {
            let Some(class) = self.classes.get(name) else {
                continue;
            };
            for slot in class.own_slots() {
                let property = &class.properties()[*slot];
                if property.default().is_none() {
                    continue;
                }
                property
                    .initial_value(self)
                    .map_err(|err| ConfigError::InvalidDefault {
                        property: property.label(),
                        reason: err.to_string(),
                    })?;
            }
        }
        Ok(())
    }
}

fn noop(_: &Instance, _: &[Value]) -> Result<Value> {
    Ok(Value::Null)
}

/// Collects class configurations and handlers, then builds a [`Catalog`].
pub struct CatalogBuilder {
    configs: Vec<ClassConfig>,
    handlers: HashMap<String, Handler>,
    fetcher: Option<Arc<dyn Fetch>>,
    max_depth: usize,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Handler> = HashMap::new();
        handlers.insert(NOOP_HANDLER.to_string(), Arc::new(noop));
        Self {
            configs: Vec::new(),
            handlers,
            fetcher: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Validate and add a class configuration.
    pub fn register(mut self, mut config: ClassConfig) -> Result<Self, ConfigError> {
        validate_class(&mut config)?;
        self.configs.push(config);
        Ok(self)
    }

    /// Register every class of a schema file.
    pub fn schema(self, schema: SchemaFile) -> Result<Self, ConfigError> {
        schema
            .classes
            .into_iter()
            .try_fold(self, |builder, config| builder.register(config))
    }

    /// Register a named handler for function-kind properties.
    pub fn handler(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Instance, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Fetcher used by `load` with a locator selector.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(self) -> Result<Arc<Catalog>, ConfigError> {
        let mut configs = Vec::new();
        for config in self.configs {
            flatten(config, &mut configs)?;
        }

        let by_name: HashMap<&str, &ClassConfig> = configs
            .iter()
            .map(|config| (config.class_name.as_str(), config))
            .collect();
        let mut built = HashMap::new();
        for config in &configs {
            build_class(config, &by_name, &mut built, &mut Vec::new())?;
        }

        let catalog = Arc::new(Catalog {
            classes: built,
            order: configs.iter().map(|c| c.class_name.clone()).collect(),
            handlers: self.handlers,
            fetcher: self.fetcher,
            max_depth: self.max_depth,
        });
        catalog.warn_unknown_references();
        catalog.check_defaults()?;

        info!(
            classes = catalog.len(),
            handlers = catalog.handlers.len(),
            "Built class catalog"
        );
        Ok(catalog)
    }
}

/// Hoist inline parents into the list, replacing them by name.
fn flatten(mut config: ClassConfig, out: &mut Vec<ClassConfig>) -> Result<(), ConfigError> {
    match config.extends.take() {
        Some(ParentRef::Config(parent)) => {
            let name = parent.class_name.clone();
            flatten(*parent, out)?;
            config.extends = Some(ParentRef::Name(name));
        }
        other => config.extends = other,
    }

    match out.iter().find(|c| c.class_name == config.class_name) {
        Some(existing) if existing.same_shape(&config) => {
            debug!(class = %config.class_name, "Class registered twice with the same shape");
        }
        Some(_) => {
            return Err(ConfigError::DuplicateClass {
                class: config.class_name,
            })
        }
        None => out.push(config),
    }
    Ok(())
}

fn build_class(
    config: &ClassConfig,
    configs: &HashMap<&str, &ClassConfig>,
    built: &mut HashMap<String, Arc<ClassDef>>,
    visiting: &mut Vec<String>,
) -> Result<Arc<ClassDef>, ConfigError> {
    if let Some(class) = built.get(&config.class_name) {
        return Ok(Arc::clone(class));
    }
    if visiting.contains(&config.class_name) {
        return Err(ConfigError::InheritanceCycle {
            class: config.class_name.clone(),
        });
    }

    visiting.push(config.class_name.clone());
    let parent = match &config.extends {
        Some(parent) => {
            let parent_config =
                configs
                    .get(parent.class_name())
                    .ok_or_else(|| ConfigError::UnknownParent {
                        class: config.class_name.clone(),
                        parent: parent.class_name().to_string(),
                    })?;
            Some(build_class(parent_config, configs, built, visiting)?)
        }
        None => None,
    };
    visiting.pop();

    let class = Arc::new(ClassDef::new(config, parent)?);
    debug!(
        class = class.name(),
        properties = class.properties().len(),
        table = class.table().map(|t| t.name.as_str()),
        "Synthesized class"
    );
    built.insert(config.class_name.clone(), Arc::clone(&class));
    Ok(class)
}

/// Creates instances of one synthesized class.
#[derive(Debug, Clone)]
pub struct ClassFactory {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) class: Arc<ClassDef>,
}

impl ClassFactory {
    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Construct an instance from a seed (record, JSON value or nothing).
    pub fn create(&self, seed: impl Into<Seed>) -> Result<Instance> {
        let mut instance = self.blank();
        instance.initialize(seed.into())?;
        Ok(instance)
    }

    /// Construct an instance holding only defaults.
    pub fn new_instance(&self) -> Result<Instance> {
        self.create(Seed::Empty)
    }

    /// Construct an instance from its transport string form.
    pub fn from_json(&self, text: &str) -> Result<Instance> {
        self.create(text.parse::<Seed>()?)
    }

    /// Instance holding kind defaults, before any initializer ran.
    pub(crate) fn blank(&self) -> Instance {
        Instance::blank(Arc::clone(&self.catalog), Arc::clone(&self.class))
    }

    /// Instance a stored row is loaded into: configured defaults when they
    /// apply, kind defaults otherwise.
    pub(crate) fn placeholder(&self) -> Instance {
        let mut instance = self.blank();
        if let Err(err) = instance.initialize(Seed::Empty) {
            debug!(class = self.name(), %err, "Defaults rejected, loading over kind defaults");
        }
        instance
    }
}

/// Synthesize a single class.
///
/// Inline parents are synthesized along with it; parents referenced by name
/// must be registered on a [`CatalogBuilder`] instead.
pub fn synthesize(config: ClassConfig) -> Result<ClassFactory> {
    let name = config.class_name.clone();
    let catalog = CatalogBuilder::new().register(config)?.build()?;
    catalog.factory(&name)
}
