//! Versioned JSON wire schema for instances.
//!
//! Version 2 is the current envelope:
//!
//! ```json
//! {"class": "Worker", "version": 2, "fields": {"id": 7, "name": "Ada"}}
//! ```
//!
//! Version 1 envelopes stored every field under an underscore-prefixed name
//! (`_id`, `_name`); they are mapped back to property names explicitly.
//! A bare JSON object is read as fields keyed by property name. Keys that
//! match no property are ignored.

use crate::class::{Catalog, ClassDef};
use crate::error::{ClassError, Result};
use crate::instance::Instance;
use crate::property::Property;
use crate::registry::Native;
use crate::value::{Record, Value};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::SecondsFormat;
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Version written by [`encode`].
pub const WIRE_VERSION: u64 = 2;

const V1_FIELD_PREFIX: &str = "_";

/// Envelope for an instance.
pub fn encode(instance: &Instance) -> Json {
    json!({
        "class": instance.class_name(),
        "version": WIRE_VERSION,
        "fields": fields_to_json(instance),
    })
}

/// Field map of an instance, keyed by property name.
pub fn fields_to_json(instance: &Instance) -> Json {
    Json::Object(
        instance
            .values()
            .map(|(name, value)| (name.to_string(), value_to_json(value)))
            .collect(),
    )
}

/// JSON form of a value. Bytes become base64 text and dates RFC 3339 text
/// with microseconds.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => json!(i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Text(text) | Value::Handler(text) => Json::String(text.clone()),
        Value::Bytes(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::Date(date) => Json::String(date.to_rfc3339_opts(SecondsFormat::Micros, true)),
        Value::Set(members) => json!(members),
        Value::Object(instance) => encode(instance),
        Value::Record(record) => {
            let fields: Map<String, Json> = record
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect();
            match &record.class {
                Some(class) => json!({
                    "class": class,
                    "version": WIRE_VERSION,
                    "fields": fields,
                }),
                None => Json::Object(fields),
            }
        }
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

/// Read an instance payload against `class`.
///
/// When the envelope names a class known to the catalog, its properties are
/// used instead; the tag is kept on the returned record.
pub fn decode_fields(class: &ClassDef, json: &Json, catalog: &Arc<Catalog>) -> Result<Record> {
    let object = json.as_object().ok_or_else(|| {
        ClassError::Wire(format!(
            "expected an object for class `{}`, found {}",
            class.name(),
            json_shape(json)
        ))
    })?;

    let (tag, fields, prefix) = match object.get("version") {
        Some(version) => {
            let version = version
                .as_u64()
                .ok_or_else(|| ClassError::Wire(format!("invalid wire version {version}")))?;
            let prefix = match version {
                1 => V1_FIELD_PREFIX,
                2 => "",
                other => {
                    return Err(ClassError::Wire(format!(
                        "unsupported wire version {other}"
                    )))
                }
            };
            let fields = object
                .get("fields")
                .and_then(Json::as_object)
                .ok_or_else(|| ClassError::Wire("envelope without a `fields` object".to_string()))?;
            (envelope_tag(object), fields, prefix)
        }
        None => match object.get("fields").and_then(Json::as_object) {
            Some(fields) if object.contains_key("class") => (envelope_tag(object), fields, ""),
            _ => (None, object, ""),
        },
    };

    let target = tag
        .as_deref()
        .and_then(|tag| catalog.class(tag))
        .map(|class| class.as_ref())
        .unwrap_or(class);

    let mut values = BTreeMap::new();
    for (key, json) in fields {
        let Some(name) = key.strip_prefix(prefix) else {
            debug!(class = target.name(), field = %key, "Ignoring unprefixed field in version 1 payload");
            continue;
        };
        match target.property(name) {
            Some(property) => {
                values.insert(name.to_string(), json_to_value(json, property, catalog)?);
            }
            None => {
                debug!(class = target.name(), field = %key, "Ignoring unknown field");
            }
        }
    }

    Ok(Record {
        class: tag,
        fields: values,
    })
}

fn envelope_tag(object: &Map<String, Json>) -> Option<String> {
    object
        .get("class")
        .and_then(Json::as_str)
        .map(str::to_string)
}

/// Convert JSON into a value shaped for `property`. The result still goes
/// through the property's validate-and-coerce rule.
pub fn json_to_value(json: &Json, property: &Property, catalog: &Arc<Catalog>) -> Result<Value> {
    let value = match (property.descriptor().native, json) {
        (_, Json::Null) => Value::Null,
        (Native::Bytes, Json::String(text)) => Value::Bytes(STANDARD.decode(text).map_err(|e| {
            ClassError::Wire(format!("{}: invalid base64: {e}", property.label()))
        })?),
        (Native::Bytes, Json::Array(items)) => Value::Bytes(
            items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| {
                    ClassError::Wire(format!("{}: byte arrays hold 0..=255", property.label()))
                })?,
        ),
        (Native::Handler, Json::String(name)) => Value::Handler(name.clone()),
        (Native::Object, Json::Object(_)) => object_from_json(json, property, catalog)?,
        (Native::Array, Json::Array(items)) => match property.element() {
            Some(element) => Value::Array(
                items
                    .iter()
                    .map(|item| json_to_value(item, element, catalog))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => plain(json),
        },
        _ => plain(json),
    };
    Ok(value)
}

fn object_from_json(json: &Json, property: &Property, catalog: &Arc<Catalog>) -> Result<Value> {
    let tag = json
        .get("fields")
        .and(json.get("class"))
        .and_then(Json::as_str);
    let class_name = tag.or(property.class_constraint());
    match class_name.and_then(|name| catalog.class(name)) {
        Some(class) => Ok(Value::Record(decode_fields(class, json, catalog)?)),
        None => Ok(plain(json)),
    }
}

/// Shape-only conversion, used where no property guides it.
pub fn plain(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(text) => Value::Text(text.clone()),
        Json::Array(items) => Value::Array(items.iter().map(plain).collect()),
        Json::Object(object) => Value::Record(Record {
            class: None,
            fields: object
                .iter()
                .map(|(key, value)| (key.clone(), plain(value)))
                .collect(),
        }),
    }
}

fn json_shape(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
