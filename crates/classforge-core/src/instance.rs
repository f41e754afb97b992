//! Generated instances and their accessors.

use crate::array::ArrayHandle;
use crate::class::{Catalog, ClassDef, ClassFactory};
use crate::error::{ClassError, Result};
use crate::property::IDENTITY;
use crate::registry::Native;
use crate::value::{Record, Value};
use crate::wire;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Seed data accepted by the constructor and the initializer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Seed {
    #[default]
    Empty,
    /// Values keyed by property name.
    Record(Record),
    /// Wire payload: a versioned envelope or a bare object.
    Json(serde_json::Value),
}

impl From<Record> for Seed {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<serde_json::Value> for Seed {
    fn from(json: serde_json::Value) -> Self {
        Self::Json(json)
    }
}

impl From<()> for Seed {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

/// Transport string form: JSON text, or blank for no seed.
impl FromStr for Seed {
    type Err = ClassError;

    fn from_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::Empty);
        }
        Ok(Self::Json(serde_json::from_str(text)?))
    }
}

/// Outcome of a dynamic accessor call.
#[derive(Debug)]
pub enum Access<'a> {
    /// Zero-argument call: the current value.
    Value(Value),
    /// One-argument call: the instance, for chaining.
    Instance(&'a mut Instance),
}

impl Access<'_> {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Instance(_) => None,
        }
    }
}

/// Instance of a synthesized class: one slot per property, inherited first.
#[derive(Clone)]
pub struct Instance {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) class: Arc<ClassDef>,
    pub(crate) slots: Vec<Value>,
}

impl Instance {
    pub(crate) fn blank(catalog: Arc<Catalog>, class: Arc<ClassDef>) -> Self {
        let slots = class
            .properties()
            .iter()
            .map(|property| property.builtin_default())
            .collect();
        Self {
            catalog,
            class,
            slots,
        }
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Tag check against the class and its ancestors.
    pub fn is_a(&self, class: &str) -> bool {
        self.class.is_a(class)
    }

    pub fn factory(&self) -> ClassFactory {
        ClassFactory {
            catalog: Arc::clone(&self.catalog),
            class: Arc::clone(&self.class),
        }
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.class
            .slot(name)
            .ok_or_else(|| ClassError::UnknownProperty {
                class: self.class_name().to_string(),
                property: name.to_string(),
            })
    }

    /// Getter: current value, through the read transform when configured.
    pub fn get(&self, name: &str) -> Result<Value> {
        let slot = self.slot(name)?;
        Ok(self.class.properties()[slot].read(&self.slots[slot]))
    }

    /// Setter: validate-and-coerce, then store. Returns the instance for
    /// chaining.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let slot = self.slot(name)?;
        let coerced = self.class.properties()[slot].coerce(value.into(), &self.catalog)?;
        self.slots[slot] = coerced;
        Ok(self)
    }

    /// Accessor call convention: no argument reads, one argument writes.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Access<'_>> {
        let count = args.len();
        let mut args = args.into_iter();
        match (args.next(), count) {
            (None, _) => Ok(Access::Value(self.get(name)?)),
            (Some(value), 1) => Ok(Access::Instance(self.set(name, value)?)),
            _ => Err(ClassError::InvalidSignature(format!(
                "accessor `{name}` takes zero or one argument, received {count}"
            ))),
        }
    }

    /// Mutation handle for an array property; every new element is
    /// validated like a wholesale assignment.
    pub fn array(&mut self, name: &str) -> Result<ArrayHandle<'_>> {
        let slot = self.slot(name)?;
        let property = Arc::clone(&self.class.properties()[slot]);
        if property.element().is_none() {
            return Err(ClassError::InvalidSignature(format!(
                "`{name}` is not an array property"
            )));
        }
        Ok(ArrayHandle::new(property, &self.catalog, &mut self.slots[slot]))
    }

    /// Identity value, when the class has one and it is set. Zero marks a
    /// row that was never inserted.
    pub fn id(&self) -> Option<i64> {
        let slot = match self.class.table() {
            Some(table) => table.identity,
            None => self.class.slot(IDENTITY)?,
        };
        self.slots[slot].as_i64().filter(|&id| id != 0)
    }

    /// Raw property values in slot order, without read transforms.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.class
            .properties()
            .iter()
            .map(|property| property.name.as_str())
            .zip(self.slots.iter())
    }

    /// Run the initializer: parent layers first, then each declared
    /// property takes the seed value, else its configured default, else
    /// the kind default. Nothing changes when any value is rejected.
    pub fn initialize(&mut self, seed: impl Into<Seed>) -> Result<&mut Self> {
        let fields = match seed.into() {
            Seed::Empty => BTreeMap::new(),
            Seed::Record(record) => record.fields,
            Seed::Json(json) => wire::decode_fields(&self.class, &json, &self.catalog)?.fields,
        };
        for key in fields.keys() {
            if self.class.slot(key).is_none() {
                debug!(class = self.class_name(), field = %key, "Ignoring unknown seed field");
            }
        }

        let mut slots = self.slots.clone();
        initialize_layer(&self.class, &self.catalog, &fields, &mut slots)?;
        self.slots = slots;
        Ok(self)
    }

    /// Reduce to a tagged record keyed by property name.
    pub fn to_record(&self) -> Record {
        Record {
            class: Some(self.class_name().to_string()),
            fields: self
                .values()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    /// Versioned wire envelope.
    pub fn to_json(&self) -> serde_json::Value {
        wire::encode(self)
    }

    /// Call the handler a function-kind property names.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let slot = self.slot(name)?;
        if self.class.properties()[slot].descriptor().native != Native::Handler {
            return Err(ClassError::InvalidSignature(format!(
                "`{name}` is not a function property"
            )));
        }
        let handler_name = self.slots[slot]
            .as_str()
            .ok_or_else(|| ClassError::UnknownHandler(format!("{name} (unset)")))?;
        let handler = self
            .catalog
            .handler(handler_name)
            .ok_or_else(|| ClassError::UnknownHandler(handler_name.to_string()))?;
        handler(self, args)
    }
}

fn initialize_layer(
    class: &ClassDef,
    catalog: &Arc<Catalog>,
    fields: &BTreeMap<String, Value>,
    slots: &mut [Value],
) -> Result<()> {
    if let Some(parent) = class.parent() {
        initialize_layer(parent, catalog, fields, slots)?;
    }
    for &slot in class.own_slots() {
        let property = &class.properties()[slot];
        slots[slot] = match fields.get(&property.name) {
            Some(value) => property.coerce(value.clone(), catalog)?,
            None => property.initial_value(catalog)?,
        };
    }
    Ok(())
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.class_name() == other.class_name() && self.slots == other.slots
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.class_name());
        for (name, value) in self.values() {
            out.field(name, value);
        }
        out.finish()
    }
}
