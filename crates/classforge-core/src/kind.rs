//! The closed set of property kinds.
//!
//! `Kind` is the semantic value category a property holds. Every kind maps to
//! exactly one storage column type; arrays are keyed by the pair
//! `(Kind::Array, element kind)` through [`TypeKey`].

use std::fmt;

/// Semantic value category of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    // Integers
    Bit,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,

    // Floating point and exact numeric
    Real,
    Double,
    Float,
    Decimal,

    Boolean,

    // Temporal
    Date,
    Time,
    DateTime,
    Timestamp,
    Year,

    // Character data
    Char,
    VarChar,
    TinyText,
    Text,
    MediumText,
    LongText,
    Enum,
    Set,

    // Binary data
    Binary,
    VarBinary,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,

    /// Reference to a handler registered on the catalog.
    Function,

    /// Instance of a generated class.
    Object,

    /// Homogeneous sequence; the element kind lives in [`TypeKey::element`].
    Array,
}

/// Every kind that can appear as an array element.
pub const SCALAR_KINDS: &[Kind] = &[
    Kind::Bit,
    Kind::TinyInt,
    Kind::SmallInt,
    Kind::MediumInt,
    Kind::Int,
    Kind::BigInt,
    Kind::Real,
    Kind::Double,
    Kind::Float,
    Kind::Decimal,
    Kind::Boolean,
    Kind::Date,
    Kind::Time,
    Kind::DateTime,
    Kind::Timestamp,
    Kind::Year,
    Kind::Char,
    Kind::VarChar,
    Kind::TinyText,
    Kind::Text,
    Kind::MediumText,
    Kind::LongText,
    Kind::Enum,
    Kind::Set,
    Kind::Binary,
    Kind::VarBinary,
    Kind::TinyBlob,
    Kind::Blob,
    Kind::MediumBlob,
    Kind::LongBlob,
    Kind::Function,
    Kind::Object,
];

impl Kind {
    /// Look up a built-in kind by its (already lower-cased) name.
    ///
    /// Returns `None` for names that are not built in; the registry treats
    /// those as names of generated classes.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bit" => Self::Bit,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "mediumint" => Self::MediumInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "real" => Self::Real,
            "double" => Self::Double,
            "float" => Self::Float,
            "decimal" | "numeric" => Self::Decimal,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            "year" => Self::Year,
            "char" => Self::Char,
            "varchar" => Self::VarChar,
            "tinytext" => Self::TinyText,
            "text" => Self::Text,
            "mediumtext" => Self::MediumText,
            "longtext" => Self::LongText,
            "enum" => Self::Enum,
            "set" => Self::Set,
            "binary" => Self::Binary,
            "varbinary" => Self::VarBinary,
            "tinyblob" => Self::TinyBlob,
            "blob" => Self::Blob,
            "mediumblob" => Self::MediumBlob,
            "longblob" => Self::LongBlob,
            "function" => Self::Function,
            "object" => Self::Object,
            "array" => Self::Array,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::MediumInt => "mediumint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Double => "double",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Year => "year",
            Self::Char => "char",
            Self::VarChar => "varchar",
            Self::TinyText => "tinytext",
            Self::Text => "text",
            Self::MediumText => "mediumtext",
            Self::LongText => "longtext",
            Self::Enum => "enum",
            Self::Set => "set",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
            Self::TinyBlob => "tinyblob",
            Self::Blob => "blob",
            Self::MediumBlob => "mediumblob",
            Self::LongBlob => "longblob",
            Self::Function => "function",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Integer kinds usable as identity.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::MediumInt | Self::Int | Self::BigInt
        )
    }

    /// Kinds stored as floating point.
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Real | Self::Double | Self::Float | Self::Decimal)
    }

    /// Kinds whose values are date-values.
    pub fn is_date_like(self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Timestamp)
    }

    /// Kinds whose content may itself contain commas.
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::VarChar
                | Self::TinyText
                | Self::Text
                | Self::MediumText
                | Self::LongText
                | Self::Enum
                | Self::Set
                | Self::Time
                | Self::Function
        )
    }

    /// Kinds held as byte sequences.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Binary
                | Self::VarBinary
                | Self::TinyBlob
                | Self::Blob
                | Self::MediumBlob
                | Self::LongBlob
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registry key: a kind plus, for arrays, the element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub kind: Kind,
    pub element: Option<Kind>,
}

impl TypeKey {
    pub fn scalar(kind: Kind) -> Self {
        Self {
            kind,
            element: None,
        }
    }

    pub fn array_of(element: Kind) -> Self {
        Self {
            kind: Kind::Array,
            element: Some(element),
        }
    }

    pub fn is_array(&self) -> bool {
        self.kind == Kind::Array
    }

    /// True for nested-object and array-of-nested-object keys, whose load
    /// transform must query the external service.
    pub fn loads_objects(&self) -> bool {
        self.kind == Kind::Object || self.element == Some(Kind::Object)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element {
            Some(element) => write!(f, "array of {element}"),
            None => write!(f, "{}", self.kind),
        }
    }
}
