//! Serialize-for-storage and deserialize-from-storage rules.
//!
//! Scalars map onto [`SqlValue`] directly. Arrays of scalars are joined into
//! one text column with the descriptor's delimiter. Inside an element a
//! backslash and the delimiter's leading character are escaped with a
//! backslash; `\N` marks a null element and `\E` an empty one. Arrays of
//! nested objects and nested objects themselves are stored as compact JSON
//! references:
//!
//! ```text
//! {"type":"Worker","id":7}                      table-bound class
//! {"type":"Address","fields":{"city":"Oslo"}}   class without a table
//! [{"type":"Worker","id":7},null]               array of nested objects
//! ```
//!
//! Resolving references needs the query service, so that half lives in
//! [`crate::persist`].

use crate::coerce::{at_element, parse_date, parse_float};
use crate::error::TypeMismatch;
use crate::instance::Instance;
use crate::kind::Kind;
use crate::property::Property;
use crate::registry::{
    Native, TypeDescriptor, ARRAY_EMPTY_MARKER, ARRAY_ESCAPE, ARRAY_NULL_MARKER,
};
use crate::value::{SqlValue, Value};
use crate::wire;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;

impl TypeDescriptor {
    /// Storage representation of a coerced value.
    pub fn serialize(&self, value: &Value, property: &Property) -> SqlValue {
        match (value, property.element()) {
            (Value::Array(items), Some(element)) => match self.delimiter {
                Some(delimiter) => SqlValue::Text(join(items, element, delimiter)),
                None => SqlValue::Text(
                    serde_json::Value::Array(items.iter().map(reference_or_null).collect())
                        .to_string(),
                ),
            },
            _ => serialize_scalar(value, property),
        }
    }

    /// Value from its storage representation. Nested-object kinds are
    /// resolved by the persistence layer and rejected here.
    pub fn deserialize(&self, raw: &SqlValue, property: &Property) -> Result<Value, TypeMismatch> {
        let rejected = || {
            TypeMismatch::new(property.label(), property.expected(), stored_shape(raw))
        };
        if raw.is_null() {
            return if property.allow_null {
                Ok(Value::Null)
            } else {
                Err(rejected())
            };
        }

        match self.native {
            Native::Int if self.kind() == Kind::Bit => {
                bit_value(raw).map(Value::Int).ok_or_else(rejected)
            }
            Native::Int => raw
                .as_i64()
                .or_else(|| sql_f64(raw).map(|f| f.trunc() as i64))
                .map(Value::Int)
                .ok_or_else(rejected),
            Native::Float => sql_f64(raw).map(Value::Float).ok_or_else(rejected),
            Native::Bool => sql_bool(raw).map(Value::Bool).ok_or_else(rejected),
            Native::Text => raw
                .as_text()
                .map(|text| Value::Text(text.into_owned()))
                .ok_or_else(rejected),
            Native::Bytes => match raw {
                SqlValue::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
                SqlValue::Text(text) => Ok(Value::Bytes(text.clone().into_bytes())),
                _ => Err(rejected()),
            },
            Native::Date => raw
                .as_text()
                .and_then(|text| parse_date(&text))
                .map(Value::Date)
                .ok_or_else(rejected),
            Native::Set => {
                let text = raw.as_text().ok_or_else(rejected)?;
                if text.is_empty() {
                    Ok(Value::Set(Vec::new()))
                } else {
                    Ok(Value::set(text.split(',')))
                }
            }
            Native::Handler => raw
                .as_text()
                .map(|text| Value::Handler(text.into_owned()))
                .ok_or_else(rejected),
            Native::Array => match (self.delimiter, property.element()) {
                (Some(delimiter), Some(element)) => {
                    let text = raw.as_text().ok_or_else(rejected)?;
                    split(&text, element, delimiter, &property.label()).map(Value::Array)
                }
                _ => Err(rejected()),
            },
            Native::Object => Err(rejected()),
        }
    }
}

fn serialize_scalar(value: &Value, property: &Property) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Int(i64::from(*b)),
        Value::Int(i) => SqlValue::Int(*i),
        Value::Float(f) => SqlValue::Double(*f),
        Value::Text(text) | Value::Handler(text) => SqlValue::Text(text.clone()),
        Value::Bytes(bytes) => SqlValue::Bytes(bytes.clone()),
        Value::Date(date) => SqlValue::Text(format_date(date, property)),
        Value::Set(members) => SqlValue::Text(members.join(",")),
        Value::Object(instance) => SqlValue::Text(reference(instance).to_string()),
        Value::Record(_) | Value::Array(_) => SqlValue::Text(wire::value_to_json(value).to_string()),
    }
}

/// Fixed-format timestamp text at the property's precision.
pub fn format_date(date: &DateTime<Utc>, property: &Property) -> String {
    if property.kind() == Kind::Date {
        return date.format("%Y-%m-%d").to_string();
    }
    let seconds = date.format("%Y-%m-%d %H:%M:%S").to_string();
    match property.fsp() as usize {
        0 => seconds,
        fsp => {
            let nanos = format!("{:09}", date.timestamp_subsec_nanos().min(999_999_999));
            format!("{seconds}.{}", &nanos[..fsp])
        }
    }
}

/// Compact reference to a nested instance.
pub(crate) fn reference(instance: &Instance) -> serde_json::Value {
    if instance.class().table().is_some() {
        let id = instance.id();
        if id.is_none() {
            warn!(
                class = instance.class_name(),
                "Serializing a reference to an instance that has not been inserted"
            );
        }
        json!({ "type": instance.class_name(), "id": id })
    } else {
        json!({ "type": instance.class_name(), "fields": wire::fields_to_json(instance) })
    }
}

fn reference_or_null(value: &Value) -> serde_json::Value {
    match value {
        Value::Object(instance) => reference(instance),
        _ => serde_json::Value::Null,
    }
}

/// Decoded nested-object reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoredRef {
    Id { class: String, id: Option<i64> },
    Inline { class: String, fields: serde_json::Value },
}

impl StoredRef {
    pub(crate) fn parse(json: &serde_json::Value) -> Option<Self> {
        let object = json.as_object()?;
        let class = object.get("type")?.as_str()?.to_string();
        if let Some(fields) = object.get("fields") {
            return Some(Self::Inline {
                class,
                fields: fields.clone(),
            });
        }
        match object.get("id")? {
            serde_json::Value::Null => Some(Self::Id { class, id: None }),
            id => Some(Self::Id {
                class,
                id: Some(id.as_i64()?),
            }),
        }
    }

    pub(crate) fn class(&self) -> &str {
        match self {
            Self::Id { class, .. } | Self::Inline { class, .. } => class,
        }
    }
}

fn join(items: &[Value], element: &Property, delimiter: &str) -> String {
    items
        .iter()
        .map(|item| match element.save(item) {
            SqlValue::Null => ARRAY_NULL_MARKER.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Double(f) => f.to_string(),
            SqlValue::Text(text) => escape(&text, delimiter),
            SqlValue::Bytes(bytes) => STANDARD.encode(bytes),
        })
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn escape(text: &str, delimiter: &str) -> String {
    if text.is_empty() {
        return ARRAY_EMPTY_MARKER.to_string();
    }
    let lead = delimiter.chars().next();
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == ARRAY_ESCAPE || Some(c) == lead {
            out.push(ARRAY_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Split stored text into unescaped pieces; `None` is a null element.
fn pieces(text: &str, delimiter: &str) -> Vec<Option<String>> {
    let skip = delimiter.chars().count().saturating_sub(1);
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut null = false;
    let mut chars = text.char_indices();
    while let Some((at, c)) = chars.next() {
        if c == ARRAY_ESCAPE {
            match chars.next() {
                Some((_, 'N')) => null = true,
                Some((_, 'E')) => {}
                Some((_, escaped)) => piece.push(escaped),
                None => piece.push(ARRAY_ESCAPE),
            }
        } else if text[at..].starts_with(delimiter) {
            let done = std::mem::take(&mut piece);
            pieces.push((!null).then_some(done));
            null = false;
            for _ in 0..skip {
                chars.next();
            }
        } else {
            piece.push(c);
        }
    }
    pieces.push((!null).then_some(piece));
    pieces
}

fn split(
    text: &str,
    element: &Property,
    delimiter: &str,
    label: &str,
) -> Result<Vec<Value>, TypeMismatch> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    pieces(text, delimiter)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let Some(piece) = piece else {
                if element.allow_null {
                    return Ok(Value::Null);
                }
                return Err(TypeMismatch::new(label, element.expected(), "stored null")
                    .at_index(label, index));
            };
            let raw = if element.kind().is_binary() {
                SqlValue::Bytes(STANDARD.decode(&piece).map_err(|_| {
                    TypeMismatch::new(label, element.expected(), format!("stored `{piece}`"))
                        .at_index(label, index)
                })?)
            } else {
                SqlValue::Text(piece)
            };
            element
                .restore(&raw)
                .map_err(|err| at_element(err, label, index))
        })
        .collect()
}

fn stored_shape(raw: &SqlValue) -> String {
    match raw {
        SqlValue::Null => "stored null".to_string(),
        SqlValue::Int(i) => format!("stored integer {i}"),
        SqlValue::UInt(u) => format!("stored integer {u}"),
        SqlValue::Double(f) => format!("stored float {f}"),
        SqlValue::Text(text) => format!("stored text `{text}`"),
        SqlValue::Bytes(bytes) => format!("stored bytes ({} long)", bytes.len()),
    }
}

fn sql_f64(raw: &SqlValue) -> Option<f64> {
    match raw {
        SqlValue::Int(i) => Some(*i as f64),
        SqlValue::UInt(u) => Some(*u as f64),
        SqlValue::Double(f) => Some(*f),
        _ => parse_float(&raw.as_text()?),
    }
}

fn sql_bool(raw: &SqlValue) -> Option<bool> {
    if let Some(i) = raw.as_i64() {
        return Some(i != 0);
    }
    match raw.as_text()?.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => sql_f64(raw).map(|f| f != 0.0),
    }
}

/// BIT columns arrive as numeric text or as big-endian bytes.
fn bit_value(raw: &SqlValue) -> Option<i64> {
    if let Some(i) = raw.as_i64() {
        return Some(i);
    }
    let bytes = match raw {
        SqlValue::Bytes(bytes) => bytes.as_slice(),
        SqlValue::Text(text) => text.as_bytes(),
        _ => return None,
    };
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0i64, |acc, b| (acc << 8) | i64::from(*b)))
}
