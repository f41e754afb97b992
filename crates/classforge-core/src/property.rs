//! Resolved, immutable property definitions.
//!
//! A [`Property`] is built from a validated [`PropertyConfig`] and carries
//! everything the synthesized accessors and persistence methods need: the
//! resolved descriptor, the instance constraint, the element definition for
//! arrays, nullability and the user transform overrides.

use crate::class::Catalog;
use crate::config::{PropertyConfig, Transforms};
use crate::error::{ConfigError, Result, TypeMismatch};
use crate::kind::Kind;
use crate::registry::TypeDescriptor;
use crate::validate::validate_property;
use crate::value::{SqlValue, Value};
use crate::wire;
use std::sync::Arc;

/// Fractional-second precision used when a temporal kind has no length.
pub const DEFAULT_FSP: u32 = 6;

/// Name of the identity property of table-bound classes.
pub const IDENTITY: &str = "id";

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    /// Class that declared the property; empty for stand-alone properties.
    pub owner: String,
    descriptor: &'static TypeDescriptor,
    class: Option<String>,
    element: Option<Box<Property>>,
    pub allow_null: bool,
    pub store: bool,
    default: Option<serde_json::Value>,
    pub length: Option<u32>,
    pub decimals: Option<u32>,
    pub values: Vec<String>,
    pub unsigned: bool,
    pub zerofill: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub charset: Option<String>,
    pub collate: Option<String>,
    pub comment: Option<String>,
    transforms: Transforms,
}

impl Property {
    /// Build a property, validating a copy of the configuration first when
    /// it has not been validated yet.
    pub fn from_config(config: &PropertyConfig) -> Result<Self, ConfigError> {
        if config.descriptor().is_some() {
            return Self::from_validated(config);
        }
        let mut config = config.clone();
        validate_property(&mut config)?;
        Self::from_validated(&config)
    }

    fn from_validated(config: &PropertyConfig) -> Result<Self, ConfigError> {
        let descriptor = config
            .descriptor()
            .ok_or_else(|| ConfigError::UnknownType {
                property: config.label(),
                kind: config.kind.clone().unwrap_or_default(),
            })?;

        let element = match &config.array_of {
            Some(element) if descriptor.key.is_array() => {
                Some(Box::new(Self::from_validated(element)?))
            }
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            owner: config.owner.clone().unwrap_or_default(),
            descriptor,
            class: config.constraint.clone(),
            element,
            allow_null: config.allow_null.unwrap_or(descriptor.nullable_by_default),
            store: config.store.unwrap_or(true),
            default: config.default.clone(),
            length: config.length_value(),
            decimals: config.decimals_value(),
            values: config.values.clone(),
            unsigned: config.unsigned,
            zerofill: config.zerofill,
            unique: config.unique,
            auto_increment: config.auto_increment,
            charset: config.charset.clone(),
            collate: config.collate.clone(),
            comment: config.comment.clone(),
            transforms: config.transforms.clone(),
        })
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub fn kind(&self) -> Kind {
        self.descriptor.kind()
    }

    /// Class a nested-object value (or array element) must be an instance of.
    pub fn class_constraint(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Element definition of an array property.
    pub fn element(&self) -> Option<&Property> {
        self.element.as_deref()
    }

    pub fn default(&self) -> Option<&serde_json::Value> {
        self.default.as_ref()
    }

    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY
    }

    /// Fractional-second precision of temporal kinds.
    pub fn fsp(&self) -> u32 {
        self.length.unwrap_or(DEFAULT_FSP).min(DEFAULT_FSP)
    }

    /// Column width of text and binary kinds. CHAR and BINARY without a
    /// length take the widest column their kind allows.
    pub fn width(&self) -> Option<u32> {
        match self.kind() {
            Kind::Char | Kind::Binary => self
                .length
                .or_else(|| self.descriptor.length.map(|bounds| bounds.max)),
            _ => self.length,
        }
    }

    /// `Owner.name`, or the bare name for stand-alone properties.
    pub fn label(&self) -> String {
        if self.owner.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.owner, self.name)
        }
    }

    /// Human readable description of what the property accepts.
    pub fn expected(&self) -> String {
        if let Some(element) = &self.element {
            return format!("array of {}", element.expected());
        }
        if let Some(class) = &self.class {
            return format!("instance of {class}");
        }
        if !self.values.is_empty() {
            return format!("{} ({})", self.descriptor.key, self.values.join(", "));
        }
        self.descriptor.key.to_string()
    }

    /// Validate-and-coerce a written value. A user `set` transform replaces
    /// the kind's rule.
    pub fn coerce(&self, value: Value, catalog: &Arc<Catalog>) -> Result<Value, TypeMismatch> {
        match &self.transforms.set {
            Some(set) => set(value),
            None => self.descriptor.coerce(value, self, catalog),
        }
    }

    /// Value returned by the getter.
    pub fn read(&self, value: &Value) -> Value {
        match &self.transforms.get {
            Some(get) => get(value),
            None => value.clone(),
        }
    }

    /// Storage representation of a value.
    pub fn save(&self, value: &Value) -> SqlValue {
        match &self.transforms.save {
            Some(save) => save(value),
            None => self.descriptor.serialize(value, self),
        }
    }

    /// Deserialize a stored value that does not reference other objects.
    pub fn restore(&self, raw: &SqlValue) -> Result<Value, TypeMismatch> {
        match &self.transforms.load {
            Some(load) => load(raw),
            None => self.descriptor.deserialize(raw, self),
        }
    }

    pub(crate) fn has_load_transform(&self) -> bool {
        self.transforms.load.is_some()
    }

    /// Kind default: enums start at their first member.
    pub fn builtin_default(&self) -> Value {
        if self.kind() == Kind::Enum {
            if let Some(first) = self.values.first() {
                return Value::Text(first.clone());
            }
        }
        self.descriptor.default_value(self.allow_null)
    }

    /// Value the initializer uses when the seed does not provide one:
    /// the configured default, else the kind default, coerced either way.
    pub fn initial_value(&self, catalog: &Arc<Catalog>) -> Result<Value> {
        let value = match &self.default {
            Some(json) => wire::json_to_value(json, self, catalog)?,
            None => self.builtin_default(),
        };
        Ok(self.coerce(value, catalog)?)
    }
}
