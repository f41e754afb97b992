//! The type registry.
//!
//! A static, immutable catalog of [`TypeDescriptor`]s keyed by
//! [`TypeKey`]. It is built once on first use and never mutated. Names that
//! are not built-in kinds resolve to the generic nested-object descriptor,
//! which is how generated classes become property types without being
//! registered ahead of time.
//!
//! The transforms themselves live in [`crate::coerce`] (validate-and-coerce)
//! and [`crate::storage`] (serialize/deserialize) as methods on
//! `TypeDescriptor`.

use crate::kind::{Kind, TypeKey, SCALAR_KINDS};
use crate::value::Value;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Delimiter for arrays of kinds whose text never contains a comma.
pub const ARRAY_DELIMITER: &str = ",";

/// Delimiter for arrays of text-like kinds.
pub const ARRAY_TEXT_DELIMITER: &str = "!&|&!";

/// Marker for a null element inside a delimited array.
pub const ARRAY_NULL_MARKER: &str = "\\N";

/// Marker for an empty-string element, so `[""]` stays distinct from `[]`.
pub const ARRAY_EMPTY_MARKER: &str = "\\E";

/// Escapes a backslash or the leading character of the delimiter inside an
/// element.
pub const ARRAY_ESCAPE: char = '\\';

/// In-memory shape a kind maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Int,
    Float,
    Bool,
    Text,
    Bytes,
    Date,
    Set,
    Handler,
    Object,
    Array,
}

/// Inclusive bounds for a length or decimals setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Immutable catalog entry for one kind.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub native: Native,
    /// Persistence column type tag.
    pub column_type: &'static str,
    /// Allowed length, `None` when length does not apply.
    pub length: Option<Bounds>,
    pub length_required: bool,
    /// Allowed decimals, `None` when decimals do not apply.
    pub decimals: Option<Bounds>,
    /// A configured length must come with decimals.
    pub decimals_required: bool,
    /// `allow_null` default when the property does not set it.
    pub nullable_by_default: bool,
    /// Join/split delimiter for delimited arrays.
    pub delimiter: Option<&'static str>,
}

/// Built-in handler every catalog registers; default for function kinds.
pub const NOOP_HANDLER: &str = "noop";

impl TypeDescriptor {
    fn scalar(kind: Kind) -> Self {
        let (native, column_type) = match kind {
            Kind::Bit => (Native::Int, "BIT"),
            Kind::TinyInt => (Native::Int, "TINYINT"),
            Kind::SmallInt => (Native::Int, "SMALLINT"),
            Kind::MediumInt => (Native::Int, "MEDIUMINT"),
            Kind::Int => (Native::Int, "INT"),
            Kind::BigInt => (Native::Int, "BIGINT"),
            Kind::Real => (Native::Float, "REAL"),
            Kind::Double => (Native::Float, "DOUBLE"),
            Kind::Float => (Native::Float, "FLOAT"),
            Kind::Decimal => (Native::Float, "DECIMAL"),
            Kind::Boolean => (Native::Bool, "TINYINT"),
            Kind::Date => (Native::Date, "DATE"),
            Kind::Time => (Native::Text, "TIME"),
            Kind::DateTime => (Native::Date, "DATETIME"),
            Kind::Timestamp => (Native::Date, "TIMESTAMP"),
            Kind::Year => (Native::Int, "YEAR"),
            Kind::Char => (Native::Text, "CHAR"),
            Kind::VarChar => (Native::Text, "VARCHAR"),
            Kind::TinyText => (Native::Text, "TINYTEXT"),
            Kind::Text => (Native::Text, "TEXT"),
            Kind::MediumText => (Native::Text, "MEDIUMTEXT"),
            Kind::LongText => (Native::Text, "LONGTEXT"),
            Kind::Enum => (Native::Text, "ENUM"),
            Kind::Set => (Native::Set, "SET"),
            Kind::Binary => (Native::Bytes, "BINARY"),
            Kind::VarBinary => (Native::Bytes, "VARBINARY"),
            Kind::TinyBlob => (Native::Bytes, "TINYBLOB"),
            Kind::Blob => (Native::Bytes, "BLOB"),
            Kind::MediumBlob => (Native::Bytes, "MEDIUMBLOB"),
            Kind::LongBlob => (Native::Bytes, "LONGBLOB"),
            Kind::Function => (Native::Handler, "VARCHAR"),
            Kind::Object => (Native::Object, "MEDIUMTEXT"),
            Kind::Array => (Native::Array, "MEDIUMTEXT"),
        };

        let (length, length_required) = match kind {
            Kind::Bit => (Some(Bounds::new(1, 64)), false),
            Kind::TinyInt => (Some(Bounds::new(1, 4)), false),
            Kind::SmallInt => (Some(Bounds::new(1, 6)), false),
            Kind::MediumInt => (Some(Bounds::new(1, 8)), false),
            Kind::Int => (Some(Bounds::new(1, 11)), false),
            Kind::BigInt => (Some(Bounds::new(1, 20)), false),
            Kind::Real | Kind::Double | Kind::Float => (Some(Bounds::new(1, 255)), false),
            Kind::Decimal => (Some(Bounds::new(1, 65)), false),
            Kind::Time | Kind::DateTime | Kind::Timestamp => (Some(Bounds::new(0, 6)), false),
            Kind::Year => (Some(Bounds::new(4, 4)), false),
            Kind::Char | Kind::Binary => (Some(Bounds::new(1, 255)), false),
            Kind::VarChar | Kind::VarBinary => (Some(Bounds::new(1, 65535)), true),
            _ => (None, false),
        };

        let (decimals, decimals_required) = match kind {
            Kind::Real | Kind::Double | Kind::Float => (Some(Bounds::new(0, 30)), true),
            Kind::Decimal => (Some(Bounds::new(0, 30)), false),
            _ => (None, false),
        };

        Self {
            key: TypeKey::scalar(kind),
            native,
            column_type,
            length,
            length_required,
            decimals,
            decimals_required,
            nullable_by_default: kind.is_date_like() || kind == Kind::Object,
            delimiter: None,
        }
    }

    fn array(element: Kind) -> Self {
        let delimiter = if element == Kind::Object {
            None
        } else if element.is_text_like() {
            Some(ARRAY_TEXT_DELIMITER)
        } else {
            Some(ARRAY_DELIMITER)
        };

        Self {
            key: TypeKey::array_of(element),
            native: Native::Array,
            column_type: "MEDIUMTEXT",
            length: None,
            length_required: false,
            decimals: None,
            decimals_required: false,
            nullable_by_default: true,
            delimiter,
        }
    }

    pub fn kind(&self) -> Kind {
        self.key.kind
    }

    pub fn element_kind(&self) -> Option<Kind> {
        self.key.element
    }

    pub fn length_applicable(&self) -> bool {
        self.length.is_some()
    }

    pub fn decimals_applicable(&self) -> bool {
        self.decimals.is_some()
    }

    /// Built-in default for a property of this kind.
    ///
    /// Date-like kinds default to null when the property is nullable and to
    /// the Unix epoch otherwise.
    pub fn default_value(&self, allow_null: bool) -> Value {
        match self.native {
            Native::Int => Value::Int(0),
            Native::Float => Value::Float(0.0),
            Native::Bool => Value::Bool(false),
            Native::Text if self.kind() == Kind::Time => Value::Text("00:00:00".to_string()),
            Native::Text => Value::Text(String::new()),
            Native::Bytes => Value::Bytes(Vec::new()),
            Native::Date if allow_null => Value::Null,
            Native::Date => Value::Date(DateTime::<Utc>::UNIX_EPOCH),
            Native::Set => Value::Set(Vec::new()),
            Native::Handler => Value::Handler(NOOP_HANDLER.to_string()),
            Native::Object => Value::Null,
            Native::Array => Value::Array(Vec::new()),
        }
    }
}

/// Failure to resolve a kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown type {0}")]
pub struct UnknownType(pub String);

/// Outcome of resolving a kind name.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'n> {
    pub descriptor: &'static TypeDescriptor,
    /// Class the value must be an instance of, when the name fell back to
    /// the nested-object descriptor.
    pub class: Option<&'n str>,
}

/// Immutable map from [`TypeKey`] to [`TypeDescriptor`].
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<TypeKey, TypeDescriptor>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::build);

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn build() -> Self {
        let mut entries = HashMap::new();
        for kind in SCALAR_KINDS {
            let scalar = TypeDescriptor::scalar(*kind);
            entries.insert(scalar.key, scalar);
            let array = TypeDescriptor::array(*kind);
            entries.insert(array.key, array);
        }
        Self { entries }
    }

    pub fn get(&self, key: TypeKey) -> Option<&TypeDescriptor> {
        self.entries.get(&key)
    }

    /// Resolve a kind with an optional element kind.
    pub fn resolve(&self, kind: Kind, element: Option<Kind>) -> Result<&TypeDescriptor, UnknownType> {
        let key = match (kind, element) {
            (Kind::Array, Some(Kind::Array)) => {
                return Err(UnknownType("array of array".to_string()));
            }
            (Kind::Array, Some(element)) => TypeKey::array_of(element),
            (Kind::Array, None) => return Err(UnknownType("array without element".to_string())),
            (kind, _) => TypeKey::scalar(kind),
        };
        self.get(key)
            .ok_or_else(|| UnknownType(key.to_string()))
    }

    /// Resolve by name, falling back to the nested-object descriptor for
    /// names that are not built in.
    ///
    /// `element` is the element kind name when `name` is `array`; an element
    /// name that is not built in falls back to array-of-object.
    pub fn resolve_name<'n>(
        &'static self,
        name: &'n str,
        element: Option<&'n str>,
    ) -> Result<Resolution<'n>, UnknownType> {
        if name.trim().is_empty() {
            return Err(UnknownType(format!("`{name}`")));
        }
        match Kind::from_name(&name.to_ascii_lowercase()) {
            Some(Kind::Array) => {
                let element = element.ok_or_else(|| UnknownType("array without element".to_string()))?;
                let (element_kind, class) = match Kind::from_name(&element.to_ascii_lowercase()) {
                    Some(kind) => (kind, None),
                    None => (Kind::Object, Some(element)),
                };
                Ok(Resolution {
                    descriptor: self.resolve(Kind::Array, Some(element_kind))?,
                    class,
                })
            }
            Some(kind) => Ok(Resolution {
                descriptor: self.resolve(kind, None)?,
                class: None,
            }),
            None => Ok(Resolution {
                descriptor: self.resolve(Kind::Object, None)?,
                class: Some(name),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
