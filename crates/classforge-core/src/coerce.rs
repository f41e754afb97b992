//! Validate-and-coerce rules, one per native representation.
//!
//! Every rule either returns the coerced value or a [`TypeMismatch`] naming
//! the property, the expected kind and the received shape. Invalid non-null
//! values are never dropped or replaced by a default.

use crate::class::Catalog;
use crate::error::{ClassError, TypeMismatch};
use crate::instance::Seed;
use crate::kind::Kind;
use crate::property::Property;
use crate::registry::{Native, TypeDescriptor};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use std::sync::Arc;

impl TypeDescriptor {
    /// Validate `value` against this kind and coerce it to the native shape.
    pub fn coerce(
        &self,
        value: Value,
        property: &Property,
        catalog: &Arc<Catalog>,
    ) -> Result<Value, TypeMismatch> {
        if value.is_null() {
            return if property.allow_null {
                Ok(Value::Null)
            } else {
                Err(mismatch(property, &value))
            };
        }

        match self.native {
            Native::Int => coerce_int(value, property),
            Native::Float => coerce_float(value, property),
            Native::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(mismatch(property, &other)),
            },
            Native::Text => coerce_text(value, property),
            Native::Bytes => match value {
                Value::Bytes(mut bytes) => {
                    if let Some(width) = property.width() {
                        bytes.truncate(width as usize);
                    }
                    Ok(Value::Bytes(bytes))
                }
                other => Err(mismatch(property, &other)),
            },
            Native::Date => coerce_date(value, property),
            Native::Set => coerce_set(value, property),
            Native::Handler => coerce_handler(value, property, catalog),
            Native::Object => coerce_object(value, property, catalog),
            Native::Array => coerce_array(value, property, catalog),
        }
    }
}

fn mismatch(property: &Property, value: &Value) -> TypeMismatch {
    TypeMismatch::new(property.label(), property.expected(), value.shape())
}

fn coerce_int(value: Value, property: &Property) -> Result<Value, TypeMismatch> {
    match &value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Text(text) => parse_int(text)
            .map(Value::Int)
            .ok_or_else(|| mismatch(property, &value)),
        _ => Err(mismatch(property, &value)),
    }
}

fn coerce_float(value: Value, property: &Property) -> Result<Value, TypeMismatch> {
    match &value {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) if f.is_finite() => Ok(Value::Float(*f)),
        Value::Text(text) => parse_float(text)
            .map(Value::Float)
            .ok_or_else(|| mismatch(property, &value)),
        _ => Err(mismatch(property, &value)),
    }
}

/// Integer from numeric text; fractional text is truncated.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| parse_float(text).map(|f| f.trunc() as i64))
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn coerce_text(value: Value, property: &Property) -> Result<Value, TypeMismatch> {
    let text = match value {
        Value::Text(text) => text,
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        other => return Err(mismatch(property, &other)),
    };

    match property.kind() {
        Kind::Char | Kind::VarChar => Ok(Value::Text(truncate(text, property.width()))),
        Kind::Enum if !property.values.contains(&text) => Err(TypeMismatch::new(
            property.label(),
            property.expected(),
            format!("text `{text}`"),
        )),
        Kind::Time if !is_time_literal(&text) => Err(TypeMismatch::new(
            property.label(),
            property.expected(),
            format!("text `{text}`"),
        )),
        Kind::Time => Ok(Value::Text(truncate_fraction(text, property.fsp()))),
        _ => Ok(Value::Text(text)),
    }
}

/// Cut the fractional seconds of a time literal down to `fsp` digits.
fn truncate_fraction(mut text: String, fsp: u32) -> String {
    if let Some(dot) = text.find('.') {
        let end = if fsp == 0 { dot } else { dot + 1 + fsp as usize };
        if end < text.len() {
            text.truncate(end);
        }
    }
    text
}

fn truncate(text: String, length: Option<u32>) -> String {
    match length {
        Some(length) if text.chars().count() > length as usize => {
            text.chars().take(length as usize).collect()
        }
        _ => text,
    }
}

/// `[-]H:MM[:SS[.ffffff]]`, hours up to three digits.
pub(crate) fn is_time_literal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let (clock, fraction) = match body.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (body, None),
    };

    let digits = |s: &str, min: usize, max: usize| {
        (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    };
    let sexagesimal = |s: &str| digits(s, 2, 2) && s.parse::<u32>().map_or(false, |n| n < 60);

    let fields: Vec<&str> = clock.split(':').collect();
    let clock_ok = match fields.as_slice() {
        [hours, minutes] => digits(hours, 1, 3) && sexagesimal(minutes),
        [hours, minutes, seconds] => {
            digits(hours, 1, 3) && sexagesimal(minutes) && sexagesimal(seconds)
        }
        _ => false,
    };
    let fraction_ok = fraction.map_or(true, |f| fields.len() == 3 && digits(f, 1, 6));
    clock_ok && fraction_ok
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (space or `T`) or a bare date.
/// Values without an offset are taken as UTC.
pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn coerce_date(value: Value, property: &Property) -> Result<Value, TypeMismatch> {
    let date = match &value {
        Value::Date(date) => *date,
        Value::Text(text) => parse_date(text).ok_or_else(|| {
            TypeMismatch::new(property.label(), property.expected(), format!("text `{text}`"))
        })?,
        _ => return Err(mismatch(property, &value)),
    };
    Ok(Value::Date(truncate_date(date, property)))
}

/// Drop precision the storage representation cannot hold.
pub(crate) fn truncate_date(date: DateTime<Utc>, property: &Property) -> DateTime<Utc> {
    if property.kind() == Kind::Date {
        return date
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(date);
    }
    date.trunc_subsecs(property.fsp() as u16)
}

fn coerce_set(value: Value, property: &Property) -> Result<Value, TypeMismatch> {
    let members = match value {
        Value::Set(members) => members,
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Text(text) => Ok(text),
                other => Err(mismatch(property, &other)),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(mismatch(property, &other)),
    };

    for member in &members {
        let allowed = property.values.is_empty() || property.values.contains(member);
        // A SET column cannot tell an empty member from the empty set.
        if member.is_empty() || member.contains(',') || !allowed {
            return Err(TypeMismatch::new(
                property.label(),
                property.expected(),
                format!("set member `{member}`"),
            ));
        }
    }
    Ok(Value::set(members))
}

fn coerce_handler(
    value: Value,
    property: &Property,
    catalog: &Catalog,
) -> Result<Value, TypeMismatch> {
    match value {
        Value::Text(name) | Value::Handler(name) if catalog.has_handler(&name) => {
            Ok(Value::Handler(name))
        }
        Value::Text(name) | Value::Handler(name) => Err(TypeMismatch::new(
            property.label(),
            property.expected(),
            format!("unregistered handler `{name}`"),
        )),
        other => Err(mismatch(property, &other)),
    }
}

fn coerce_object(
    value: Value,
    property: &Property,
    catalog: &Arc<Catalog>,
) -> Result<Value, TypeMismatch> {
    let constraint = property.class_constraint();
    match value {
        Value::Object(instance) => match constraint {
            Some(class) if !instance.is_a(class) => Err(TypeMismatch::new(
                property.label(),
                property.expected(),
                format!("instance of {}", instance.class_name()),
            )),
            _ => Ok(Value::Object(instance)),
        },
        Value::Record(record) => {
            let shape = match &record.class {
                Some(class) => format!("record tagged {class}"),
                None => "untagged record".to_string(),
            };
            let rejected = |received: String| {
                TypeMismatch::new(property.label(), property.expected(), received)
            };

            let class = record
                .class
                .clone()
                .or_else(|| constraint.map(str::to_string))
                .ok_or_else(|| rejected(shape.clone()))?;
            let factory = catalog
                .factory(&class)
                .map_err(|_| rejected(shape.clone()))?;
            if let Some(constraint) = constraint {
                if !factory.class().is_a(constraint) {
                    return Err(rejected(shape));
                }
            }

            let instance = factory
                .create(Seed::Record(record))
                .map_err(|err| match err {
                    ClassError::TypeMismatch(inner) => inner,
                    other => rejected(other.to_string()),
                })?;
            Ok(Value::Object(Box::new(instance)))
        }
        other => Err(mismatch(property, &other)),
    }
}

fn coerce_array(
    value: Value,
    property: &Property,
    catalog: &Arc<Catalog>,
) -> Result<Value, TypeMismatch> {
    let Some(element) = property.element() else {
        return Err(mismatch(property, &value));
    };
    match value {
        Value::Array(items) => {
            let label = property.label();
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    element
                        .coerce(item, catalog)
                        .map_err(|err| at_element(err, &label, index))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Err(mismatch(property, &other)),
    }
}

/// Point an element failure at `label[index]`; failures raised inside a
/// nested object keep their own property name.
pub(crate) fn at_element(err: TypeMismatch, label: &str, index: usize) -> TypeMismatch {
    if err.property == label {
        err.at_index(label, index)
    } else {
        err
    }
}
