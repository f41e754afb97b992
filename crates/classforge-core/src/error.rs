//! Error types for configuration, type enforcement and generated methods.

use thiserror::Error;

/// Structural problem in a property or class configuration.
///
/// Raised at class-creation time; the caller fixes the configuration and
/// tries again.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context}: property name is missing")]
    MissingName { context: String },

    #[error("{context}: `{name}` is not a valid identifier")]
    InvalidName { context: String, name: String },

    #[error("property `{property}` needs exactly one of `type` or `instance_of`")]
    KindConflict { property: String },

    #[error("property `{property}` is an array but `array_of` is missing")]
    MissingElement { property: String },

    #[error("property `{property}`: unknown type {kind}")]
    UnknownType { property: String, kind: String },

    #[error("property `{property}`: {kind} does not take a {field}")]
    NotApplicable {
        property: String,
        kind: String,
        field: &'static str,
    },

    #[error("property `{property}`: {kind} requires a {field}")]
    Required {
        property: String,
        kind: String,
        field: &'static str,
    },

    #[error("property `{property}`: {field} {value} for {kind} must be within [{min}, {max}]")]
    OutOfRange {
        property: String,
        kind: String,
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("property `{property}`: decimals given without a length")]
    DecimalsWithoutLength { property: String },

    #[error("property `{property}`: decimals ({decimals}) exceed length ({length})")]
    DecimalsExceedLength {
        property: String,
        decimals: u32,
        length: u32,
    },

    #[error("property `{property}`: member `{member}` contains a comma")]
    InvalidMember { property: String, member: String },

    #[error("property `{property}`: default value rejected: {reason}")]
    InvalidDefault { property: String, reason: String },

    #[error("class `{class}` declares property `{property}` twice")]
    DuplicateProperty { class: String, property: String },

    #[error("class `{class}`: index `{index}` names unknown column `{column}`")]
    UnknownIndexColumn {
        class: String,
        index: String,
        column: String,
    },

    #[error("class `{class}` is bound to a table but has no integer `id` property")]
    MissingIdentity { class: String },

    #[error("class `{class}`: alternate lookup property `{property}` is not declared")]
    UnknownLookupProperty { class: String, property: String },

    #[error("class `{class}` extends unknown class `{parent}`")]
    UnknownParent { class: String, parent: String },

    #[error("class `{class}` is declared twice with different configurations")]
    DuplicateClass { class: String },

    #[error("class `{class}` takes part in an inheritance cycle")]
    InheritanceCycle { class: String },

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A written value does not satisfy the declared kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("property `{property}` expects {expected}, received {received}")]
pub struct TypeMismatch {
    /// Property (or `property[index]` for array elements) being written.
    pub property: String,
    /// Human readable expected kind.
    pub expected: String,
    /// Runtime shape of the rejected value.
    pub received: String,
}

impl TypeMismatch {
    pub fn new(
        property: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Re-target the failure at an array element.
    pub fn at_index(mut self, property: &str, index: usize) -> Self {
        self.property = format!("{property}[{index}]");
        self
    }
}

/// Failure of a generated method.
#[derive(Debug, Error)]
pub enum ClassError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("class `{class}` has no property `{property}`")]
    UnknownProperty { class: String, property: String },

    #[error("unknown class `{0}`")]
    UnknownClass(String),

    #[error("unknown handler `{0}`")]
    UnknownHandler(String),

    #[error("unexpected response from query service: {0}")]
    UnexpectedResponse(String),

    #[error("nested objects exceed the maximum load depth of {0}")]
    NestingTooDeep(usize),

    #[error("invalid wire payload: {0}")]
    Wire(String),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure surfaced by the external query service, passed through as is.
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

pub type Result<T, E = ClassError> = std::result::Result<T, E>;
