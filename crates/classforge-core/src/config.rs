//! Declarative class and property configuration.
//!
//! Configurations are plain serde structures, so a whole catalog can be
//! described in a YAML schema file:
//!
//! ```yaml
//! classes:
//!   - class_name: Person
//!     table_name: people
//!     properties:
//!       - { name: id, type: int }
//!       - { name: name, type: varchar, length: 64 }
//!       - { name: tags, type: array, array_of: { type: varchar, length: 20 } }
//!   - class_name: Worker
//!     extends: Person
//!     table_name: workers
//!     properties:
//!       - { name: boss, instance_of: Person }
//! ```
//!
//! The validators in [`crate::validate`] normalize these structures in
//! place; after that they are read-only.

use crate::error::{ConfigError, TypeMismatch};
use crate::registry::TypeDescriptor;
use crate::value::{SqlValue, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Write-side override: replaces the kind's validate-and-coerce rule.
pub type SetTransform = Arc<dyn Fn(Value) -> Result<Value, TypeMismatch> + Send + Sync>;
/// Read-side transform applied by the getter.
pub type GetTransform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// Replaces the kind's serialize rule.
pub type SaveTransform = Arc<dyn Fn(&Value) -> SqlValue + Send + Sync>;
/// Replaces the kind's deserialize rule.
pub type LoadTransform = Arc<dyn Fn(&SqlValue) -> Result<Value, TypeMismatch> + Send + Sync>;

/// User supplied transform overrides. Not serializable.
#[derive(Clone, Default)]
pub struct Transforms {
    pub set: Option<SetTransform>,
    pub get: Option<GetTransform>,
    pub save: Option<SaveTransform>,
    pub load: Option<LoadTransform>,
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transforms")
            .field("set", &self.set.is_some())
            .field("get", &self.get.is_some())
            .field("save", &self.save.is_some())
            .field("load", &self.load.is_some())
            .finish()
    }
}

/// Integer setting that may be written as a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Int(u64),
    Float(f64),
    Text(String),
}

impl NumberLike {
    /// Integer value when the setting is numeric-like.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(i) => u32::try_from(*i).ok(),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64 => {
                Some(*f as u32)
            }
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<u32> for NumberLike {
    fn from(n: u32) -> Self {
        Self::Int(n as u64)
    }
}

/// Configuration of one property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyConfig {
    /// Property name; empty for array element configurations.
    #[serde(default)]
    pub name: String,

    /// Kind name (built-in kind or generated class name).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Generated class the value must be an instance of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_of: Option<String>,

    /// Element configuration when `kind` is `array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_of: Option<Box<PropertyConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_null: Option<bool>,

    /// Configured default, converted through the kind's wire conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Whether the property is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<NumberLike>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<NumberLike>,

    /// Allowed members for `enum` and `set`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default)]
    pub unsigned: bool,

    #[serde(default)]
    pub zerofill: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub auto_increment: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip)]
    pub transforms: Transforms,

    /// Owning class, filled by the class validator.
    #[serde(skip)]
    pub owner: Option<String>,

    /// Descriptor resolved by the property validator.
    #[serde(skip)]
    pub(crate) resolved: Option<&'static TypeDescriptor>,

    /// Instance constraint resolved by the property validator.
    #[serde(skip)]
    pub(crate) constraint: Option<String>,
}

impl PropertyConfig {
    /// Property of a built-in kind or a generated class name.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Property whose value must be an instance of `class`.
    pub fn instance_of(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_of: Some(class.into()),
            ..Self::default()
        }
    }

    /// Array property with the given element configuration.
    pub fn array(name: impl Into<String>, element: PropertyConfig) -> Self {
        Self {
            name: name.into(),
            kind: Some("array".to_string()),
            array_of: Some(Box::new(element)),
            ..Self::default()
        }
    }

    /// Element configuration of a built-in kind or class name.
    pub fn element(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Element configuration constrained to instances of `class`.
    pub fn element_of(class: impl Into<String>) -> Self {
        Self {
            instance_of: Some(class.into()),
            ..Self::default()
        }
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length.into());
        self
    }

    pub fn decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals.into());
        self
    }

    pub fn allow_null(mut self, allow_null: bool) -> Self {
        self.allow_null = Some(allow_null);
        self
    }

    pub fn default_value(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn on_set(
        mut self,
        f: impl Fn(Value) -> Result<Value, TypeMismatch> + Send + Sync + 'static,
    ) -> Self {
        self.transforms.set = Some(Arc::new(f));
        self
    }

    pub fn on_get(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.transforms.get = Some(Arc::new(f));
        self
    }

    pub fn on_save(mut self, f: impl Fn(&Value) -> SqlValue + Send + Sync + 'static) -> Self {
        self.transforms.save = Some(Arc::new(f));
        self
    }

    pub fn on_load(
        mut self,
        f: impl Fn(&SqlValue) -> Result<Value, TypeMismatch> + Send + Sync + 'static,
    ) -> Self {
        self.transforms.load = Some(Arc::new(f));
        self
    }

    /// Descriptor attached by validation.
    pub fn descriptor(&self) -> Option<&'static TypeDescriptor> {
        self.resolved
    }

    /// Name used in error messages: `Class.property` once the owner is known.
    pub fn label(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Normalized length, once validated.
    pub fn length_value(&self) -> Option<u32> {
        self.length.as_ref().and_then(NumberLike::as_u32)
    }

    /// Normalized decimals, once validated.
    pub fn decimals_value(&self) -> Option<u32> {
        self.decimals.as_ref().and_then(NumberLike::as_u32)
    }
}

/// Reference to a parent class: by name within the catalog, or inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    Name(String),
    Config(Box<ClassConfig>),
}

impl ParentRef {
    pub fn class_name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Config(config) => &config.class_name,
        }
    }
}

/// Index method for a named index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Btree,
    Hash,
}

/// Named index appended to the table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: IndexKind,
    #[serde(default)]
    pub unique: bool,
}

impl IndexConfig {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            kind: IndexKind::Btree,
            unique: false,
        }
    }

    pub fn hash(mut self) -> Self {
        self.kind = IndexKind::Hash;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Configuration of one generated class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassConfig {
    pub class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<ParentRef>,

    /// Declared properties; order decides column order.
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,

    /// Table binding; enables the persistence methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// Secondary unique lookup property usable by `load`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_lookup: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexConfig>,
}

impl ClassConfig {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(ParentRef::Name(parent.into()));
        self
    }

    pub fn extends_config(mut self, parent: ClassConfig) -> Self {
        self.extends = Some(ParentRef::Config(Box::new(parent)));
        self
    }

    pub fn property(mut self, property: PropertyConfig) -> Self {
        self.properties.push(property);
        self
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn alternate_lookup(mut self, property: impl Into<String>) -> Self {
        self.alternate_lookup = Some(property.into());
        self
    }

    pub fn index(mut self, index: IndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// Structural equality of the serializable parts.
    pub fn same_shape(&self, other: &ClassConfig) -> bool {
        match (serde_json::to_value(self), serde_json::to_value(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// A schema file: a list of class configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    pub classes: Vec<ClassConfig>,
}

impl SchemaFile {
    /// Load a schema from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a schema from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn get_class(&self, name: &str) -> Option<&ClassConfig> {
        self.classes.iter().find(|c| c.class_name == name)
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.class_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
classes:
  - class_name: Person
    table_name: people
    alternate_lookup: email
    properties:
      - { name: id, type: int }
      - { name: email, type: varchar, length: "128" }
      - { name: score, type: double, length: 8, decimals: 2 }
      - name: tags
        type: array
        array_of: { type: varchar, length: 20 }
    indexes:
      - { name: by_email, columns: [email], type: hash, unique: true }
  - class_name: Worker
    extends: Person
    properties:
      - { name: boss, instance_of: Person }
"#;

    #[test]
    fn test_parse_schema() {
        let schema = SchemaFile::from_yaml(SCHEMA).unwrap();
        assert_eq!(schema.class_names(), vec!["Person", "Worker"]);

        let person = schema.get_class("Person").unwrap();
        assert_eq!(person.table_name.as_deref(), Some("people"));
        assert_eq!(person.properties.len(), 4);
        assert_eq!(person.properties[1].length, Some(NumberLike::Text("128".into())));
        assert_eq!(person.properties[1].length_value(), Some(128));
        assert_eq!(
            person.properties[3].array_of.as_ref().unwrap().kind.as_deref(),
            Some("varchar")
        );
        assert_eq!(person.indexes[0].kind, IndexKind::Hash);
        assert!(person.indexes[0].unique);

        let worker = schema.get_class("Worker").unwrap();
        assert_eq!(worker.extends.as_ref().unwrap().class_name(), "Person");
        assert_eq!(worker.properties[0].instance_of.as_deref(), Some("Person"));
    }

    #[test]
    fn test_inline_parent() {
        let yaml = r#"
classes:
  - class_name: Child
    extends:
      class_name: Base
      properties:
        - { name: id, type: int }
"#;
        let schema = SchemaFile::from_yaml(yaml).unwrap();
        match schema.classes[0].extends.as_ref().unwrap() {
            ParentRef::Config(parent) => assert_eq!(parent.class_name, "Base"),
            ParentRef::Name(_) => panic!("expected inline parent"),
        }
    }

    #[test]
    fn test_properties_must_be_a_list() {
        let yaml = r#"
classes:
  - class_name: Broken
    properties: 12
"#;
        assert!(matches!(
            SchemaFile::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        let schema = SchemaFile::from_file(file.path()).unwrap();
        assert_eq!(schema.classes.len(), 2);
    }

    #[test]
    fn test_number_like() {
        assert_eq!(NumberLike::Int(4).as_u32(), Some(4));
        assert_eq!(NumberLike::Float(4.0).as_u32(), Some(4));
        assert_eq!(NumberLike::Float(4.5).as_u32(), None);
        assert_eq!(NumberLike::Text(" 12 ".into()).as_u32(), Some(12));
        assert_eq!(NumberLike::Text("wide".into()).as_u32(), None);
    }

    #[test]
    fn test_same_shape_ignores_transforms() {
        let a = ClassConfig::new("A").property(PropertyConfig::new("x", "int"));
        let b = ClassConfig::new("A")
            .property(PropertyConfig::new("x", "int").on_get(|v| v.clone()));
        let c = ClassConfig::new("A").property(PropertyConfig::new("x", "bigint"));
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }
}
