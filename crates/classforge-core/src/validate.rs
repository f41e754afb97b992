//! Property and class configuration validators.
//!
//! Both validators normalize the configuration in place (case, defaults,
//! resolved descriptor) and are idempotent: validating an already validated
//! configuration changes nothing.

use crate::config::{ClassConfig, NumberLike, ParentRef, PropertyConfig};
use crate::error::ConfigError;
use crate::kind::Kind;
use crate::registry::{registry, Bounds, Native, TypeDescriptor};

/// Identifier grammar shared with the storage layer: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a property configuration and attach its descriptor.
pub fn validate_property(config: &mut PropertyConfig) -> Result<(), ConfigError> {
    let context = match &config.owner {
        Some(owner) => format!("class `{owner}`"),
        None => "property".to_string(),
    };
    if config.name.is_empty() {
        return Err(ConfigError::MissingName { context });
    }
    if !is_identifier(&config.name) {
        return Err(ConfigError::InvalidName {
            context,
            name: config.name.clone(),
        });
    }
    resolve(config)
}

/// Validate an array element configuration; element names are derived.
fn validate_element(
    config: &mut PropertyConfig,
    parent: &PropertyConfig,
) -> Result<(), ConfigError> {
    config.name = parent.name.clone();
    config.owner = parent.owner.clone();
    resolve(config)
}

fn resolve(config: &mut PropertyConfig) -> Result<(), ConfigError> {
    let label = config.label();

    // Exactly one of a kind or an instance constraint.
    let kind_name = match (&config.kind, &config.instance_of) {
        (Some(kind), None) if !kind.trim().is_empty() => kind.trim().to_string(),
        (None, Some(class)) if !class.trim().is_empty() => class.trim().to_string(),
        _ => return Err(ConfigError::KindConflict { property: label }),
    };

    // Built-in kinds compare case-insensitively; class names keep their
    // original casing for instance checks.
    let lowered = kind_name.to_ascii_lowercase();
    let is_array =
        config.instance_of.is_none() && Kind::from_name(&lowered) == Some(Kind::Array);
    if let Some(kind) = &mut config.kind {
        if Kind::from_name(&lowered).is_some() {
            *kind = lowered.clone();
        }
    }

    let (descriptor, constraint) = if is_array {
        let mut element = config
            .array_of
            .take()
            .ok_or_else(|| ConfigError::MissingElement {
                property: label.clone(),
            })?;
        let outcome = validate_element(&mut element, config);
        let element_name = element
            .kind
            .clone()
            .or_else(|| element.instance_of.clone());
        let element_constraint = element.constraint.clone();
        config.array_of = Some(element);
        outcome?;

        let element_name = element_name.unwrap_or_default();
        let resolution = registry()
            .resolve_name("array", Some(&element_name))
            .map_err(|e| ConfigError::UnknownType {
                property: label.clone(),
                kind: e.0,
            })?;
        (resolution.descriptor, element_constraint)
    } else if config.instance_of.is_some() {
        let descriptor = registry()
            .resolve(Kind::Object, None)
            .map_err(|e| ConfigError::UnknownType {
                property: label.clone(),
                kind: e.0,
            })?;
        (descriptor, Some(kind_name.clone()))
    } else {
        let resolution = registry()
            .resolve_name(&kind_name, None)
            .map_err(|e| ConfigError::UnknownType {
                property: label.clone(),
                kind: e.0,
            })?;
        (resolution.descriptor, resolution.class.map(str::to_string))
    };

    if !is_array && config.array_of.is_some() {
        return Err(ConfigError::NotApplicable {
            property: label,
            kind: descriptor.key.to_string(),
            field: "array_of",
        });
    }

    normalize_number(&mut config.length);
    normalize_number(&mut config.decimals);
    check_bounds(config, descriptor, &label)?;
    check_members(config, descriptor, &label)?;

    if config.unsigned || config.zerofill || config.auto_increment {
        let numeric = matches!(descriptor.native, Native::Int | Native::Float)
            && !descriptor.key.is_array();
        if !numeric {
            return Err(ConfigError::NotApplicable {
                property: label,
                kind: descriptor.key.to_string(),
                field: "numeric modifier",
            });
        }
    }

    if config.allow_null.is_none() {
        config.allow_null = Some(descriptor.nullable_by_default);
    }
    if config.store.is_none() {
        config.store = Some(true);
    }
    config.resolved = Some(descriptor);
    config.constraint = constraint;
    Ok(())
}

fn normalize_number(setting: &mut Option<NumberLike>) {
    *setting = setting
        .as_ref()
        .and_then(NumberLike::as_u32)
        .map(NumberLike::from);
}

fn check_bounds(
    config: &PropertyConfig,
    descriptor: &TypeDescriptor,
    label: &str,
) -> Result<(), ConfigError> {
    let kind = descriptor.key.to_string();
    let length = config.length_value();
    let decimals = config.decimals_value();

    let within = |field: &'static str, value: u32, bounds: Bounds| {
        if bounds.contains(value) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                property: label.to_string(),
                kind: kind.clone(),
                field,
                value,
                min: bounds.min,
                max: bounds.max,
            })
        }
    };

    match (length, descriptor.length) {
        (Some(_), None) => {
            return Err(ConfigError::NotApplicable {
                property: label.to_string(),
                kind: kind.clone(),
                field: "length",
            })
        }
        (Some(value), Some(bounds)) => within("length", value, bounds)?,
        (None, _) if descriptor.length_required => {
            return Err(ConfigError::Required {
                property: label.to_string(),
                kind: kind.clone(),
                field: "length",
            })
        }
        (None, _) => {}
    }

    match (decimals, descriptor.decimals) {
        (Some(_), None) => {
            return Err(ConfigError::NotApplicable {
                property: label.to_string(),
                kind: kind.clone(),
                field: "decimals",
            })
        }
        (Some(value), Some(bounds)) => within("decimals", value, bounds)?,
        (None, _) => {}
    }

    match (length, decimals) {
        (None, Some(_)) => Err(ConfigError::DecimalsWithoutLength {
            property: label.to_string(),
        }),
        (Some(_), None) if descriptor.decimals_required => Err(ConfigError::Required {
            property: label.to_string(),
            kind: kind.clone(),
            field: "decimals",
        }),
        (Some(length), Some(decimals)) if decimals > length => {
            Err(ConfigError::DecimalsExceedLength {
                property: label.to_string(),
                decimals,
                length,
            })
        }
        _ => Ok(()),
    }
}

fn check_members(
    config: &PropertyConfig,
    descriptor: &TypeDescriptor,
    label: &str,
) -> Result<(), ConfigError> {
    let kind = descriptor.key.kind;
    if kind == Kind::Enum && config.values.is_empty() {
        return Err(ConfigError::Required {
            property: label.to_string(),
            kind: descriptor.key.to_string(),
            field: "values",
        });
    }
    if !config.values.is_empty() && !matches!(kind, Kind::Enum | Kind::Set) {
        return Err(ConfigError::NotApplicable {
            property: label.to_string(),
            kind: descriptor.key.to_string(),
            field: "values",
        });
    }
    if kind == Kind::Set {
        if let Some(member) = config.values.iter().find(|v| v.contains(',')) {
            return Err(ConfigError::InvalidMember {
                property: label.to_string(),
                member: member.clone(),
            });
        }
    }
    Ok(())
}

/// Validate a class configuration and every property it declares.
///
/// Inline parent configurations are validated recursively. Identity and
/// alternate lookup checks happen when the class is synthesized.
pub fn validate_class(config: &mut ClassConfig) -> Result<(), ConfigError> {
    if !is_identifier(&config.class_name) {
        return Err(ConfigError::InvalidName {
            context: "class".to_string(),
            name: config.class_name.clone(),
        });
    }
    if let Some(table) = &config.table_name {
        if !is_identifier(table) {
            return Err(ConfigError::InvalidName {
                context: format!("class `{}` table", config.class_name),
                name: table.clone(),
            });
        }
    }
    for index in &config.indexes {
        for name in std::iter::once(&index.name).chain(index.columns.iter()) {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidName {
                    context: format!("class `{}` index", config.class_name),
                    name: name.clone(),
                });
            }
        }
    }
    if let Some(ParentRef::Config(parent)) = &mut config.extends {
        validate_class(parent)?;
    }
    for property in &mut config.properties {
        property.owner = Some(config.class_name.clone());
        validate_property(property)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::kind::TypeKey;

    fn validated(mut config: PropertyConfig) -> PropertyConfig {
        validate_property(&mut config).unwrap();
        config
    }

    #[test]
    fn test_identifier_grammar() {
        assert!(is_identifier("id"));
        assert!(is_identifier("_private9"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_name_required() {
        let mut config = PropertyConfig::element("int");
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::MissingName { .. })
        ));
        let mut config = PropertyConfig::new("bad-name", "int");
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_kind_xor_instance_of() {
        let mut both = PropertyConfig::new("x", "int");
        both.instance_of = Some("Worker".into());
        assert!(matches!(
            validate_property(&mut both),
            Err(ConfigError::KindConflict { .. })
        ));

        let mut neither = PropertyConfig {
            name: "x".into(),
            ..PropertyConfig::default()
        };
        assert!(matches!(
            validate_property(&mut neither),
            Err(ConfigError::KindConflict { .. })
        ));
    }

    #[test]
    fn test_case_normalization_keeps_class_casing() {
        let config = validated(PropertyConfig::new("label", "VARCHAR").length(10));
        assert_eq!(config.kind.as_deref(), Some("varchar"));
        assert_eq!(config.descriptor().unwrap().kind(), Kind::VarChar);

        let config = validated(PropertyConfig::new("boss", "Worker"));
        assert_eq!(config.kind.as_deref(), Some("Worker"));
        assert_eq!(config.constraint.as_deref(), Some("Worker"));
        assert_eq!(config.descriptor().unwrap().kind(), Kind::Object);
    }

    #[test]
    fn test_array_requires_element() {
        let mut config = PropertyConfig::new("tags", "array");
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::MissingElement { .. })
        ));

        let mut config = PropertyConfig::array("tags", PropertyConfig::default());
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::KindConflict { .. })
        ));
    }

    #[test]
    fn test_array_resolution() {
        let config = validated(PropertyConfig::array("tags", PropertyConfig::element("int")));
        assert_eq!(config.descriptor().unwrap().key, TypeKey::array_of(Kind::Int));
        assert_eq!(config.allow_null, Some(true));
        let element = config.array_of.as_ref().unwrap();
        assert_eq!(element.name, "tags");
        assert_eq!(element.allow_null, Some(false));

        let config = validated(PropertyConfig::array("crew", PropertyConfig::element_of("Worker")));
        assert_eq!(config.descriptor().unwrap().key, TypeKey::array_of(Kind::Object));
        assert_eq!(config.constraint.as_deref(), Some("Worker"));
    }

    #[test]
    fn test_length_bounds() {
        let mut config = PropertyConfig::new("flag", "tinyint").length(5);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::OutOfRange { field: "length", min: 1, max: 4, .. })
        ));

        let mut config = PropertyConfig::new("body", "varchar");
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::Required { field: "length", .. })
        ));

        let mut config = PropertyConfig::new("body", "varchar").length(70000);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::OutOfRange { max: 65535, .. })
        ));

        let mut config = PropertyConfig::new("body", "text").length(10);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::NotApplicable { field: "length", .. })
        ));
    }

    #[test]
    fn test_decimals_rules() {
        let mut config = PropertyConfig::new("price", "decimal").decimals(2);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::DecimalsWithoutLength { .. })
        ));

        let mut config = PropertyConfig::new("ratio", "double").length(8);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::Required { field: "decimals", .. })
        ));

        let mut config = PropertyConfig::new("price", "decimal").length(4).decimals(6);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::DecimalsExceedLength { .. })
        ));

        validated(PropertyConfig::new("price", "decimal").length(10));
        validated(PropertyConfig::new("ratio", "double").length(8).decimals(2));
    }

    #[test]
    fn test_numeric_like_length_is_normalized() {
        let mut config = PropertyConfig::new("code", "char");
        config.length = Some(NumberLike::Text("12".into()));
        validate_property(&mut config).unwrap();
        assert_eq!(config.length, Some(NumberLike::Int(12)));

        let mut config = PropertyConfig::new("code", "char");
        config.length = Some(NumberLike::Text("wide".into()));
        validate_property(&mut config).unwrap();
        assert_eq!(config.length, None);
    }

    #[test]
    fn test_nullability_defaults() {
        assert_eq!(validated(PropertyConfig::new("n", "int")).allow_null, Some(false));
        assert_eq!(validated(PropertyConfig::new("d", "datetime")).allow_null, Some(true));
        assert_eq!(validated(PropertyConfig::new("o", "object")).allow_null, Some(true));
        assert_eq!(validated(PropertyConfig::new("t", "text")).allow_null, Some(false));
        assert_eq!(
            validated(PropertyConfig::new("d", "date").allow_null(false)).allow_null,
            Some(false)
        );
    }

    #[test]
    fn test_store_default_and_idempotence() {
        let mut config = PropertyConfig::array("tags", PropertyConfig::element("VarChar").length(20));
        validate_property(&mut config).unwrap();
        let first = serde_json::to_value(&config).unwrap();
        validate_property(&mut config).unwrap();
        assert_eq!(serde_json::to_value(&config).unwrap(), first);
        assert_eq!(config.store, Some(true));
    }

    #[test]
    fn test_enum_requires_values() {
        let mut config = PropertyConfig::new("status", "enum");
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::Required { field: "values", .. })
        ));
        validated(PropertyConfig::new("status", "enum").values(["open", "closed"]));

        let mut config = PropertyConfig::new("count", "int").values(["a"]);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::NotApplicable { field: "values", .. })
        ));
    }

    #[test]
    fn test_unsigned_only_on_numbers() {
        validated(PropertyConfig::new("count", "int").unsigned());
        let mut config = PropertyConfig::new("name", "text").unsigned();
        assert!(validate_property(&mut config).is_err());
    }

    #[test]
    fn test_validate_class_tags_owner() {
        let mut class = ClassConfig::new("Person")
            .property(PropertyConfig::new("id", "int"))
            .property(PropertyConfig::new("name", "varchar"));
        let err = validate_class(&mut class).unwrap_err();
        assert!(err.to_string().contains("Person.name"), "{err}");
        assert_eq!(class.properties[0].owner.as_deref(), Some("Person"));
    }

    #[test]
    fn test_validate_class_names() {
        let mut class = ClassConfig::new("9Person");
        assert!(matches!(
            validate_class(&mut class),
            Err(ConfigError::InvalidName { .. })
        ));

        let mut class = ClassConfig::new("Person").table("people table");
        assert!(validate_class(&mut class).is_err());

        let mut class = ClassConfig::new("Person").index(IndexConfig::new("by-name", ["name"]));
        assert!(validate_class(&mut class).is_err());
    }

    #[test]
    fn test_validate_inline_parent() {
        let parent = ClassConfig::new("Base").property(PropertyConfig::new("bad name", "int"));
        let mut class = ClassConfig::new("Child").extends_config(parent);
        let err = validate_class(&mut class).unwrap_err();
        assert!(err.to_string().contains("class `Base`"), "{err}");
    }

    #[test]
    fn test_set_members_cannot_contain_commas() {
        let mut config = PropertyConfig::new("flags", "set").values(["a,b"]);
        assert!(matches!(
            validate_property(&mut config),
            Err(ConfigError::InvalidMember { .. })
        ));
    }
}
