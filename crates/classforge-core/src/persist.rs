//! Persistence methods of table-bound classes.
//!
//! Every method talks to the database through a [`QueryService`] and issues
//! its statements one at a time, in property declaration order. Nested
//! objects referenced by identity are loaded with one lookup each; arrays of
//! references to a single class are loaded with one batched lookup.

use crate::class::{Catalog, ClassDef, ClassFactory, TableBinding};
use crate::error::{ClassError, Result, TypeMismatch};
use crate::instance::{Instance, Seed};
use crate::property::{Property, IDENTITY};
use crate::registry::Native;
use crate::service::{QueryOutput, QueryService};
use crate::statement;
use crate::storage::StoredRef;
use crate::value::{SqlRow, SqlValue, Value};
use crate::wire;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What `load` looks a row up by.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Primary identity.
    Id(i64),
    /// Alternate lookup value, or a numeric identity in text form.
    Key(String),
    /// Row data already fetched; populates without a query.
    Row(SqlRow),
    /// Resource locator handed to the catalog's fetcher.
    Url(String),
}

impl From<i64> for Selector {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for Selector {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for Selector {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<SqlRow> for Selector {
    fn from(row: SqlRow) -> Self {
        Self::Row(row)
    }
}

#[derive(Clone, Copy)]
struct LoadContext<'a> {
    service: &'a dyn QueryService,
    catalog: &'a Arc<Catalog>,
    depth: usize,
}

impl LoadContext<'_> {
    fn nested(self) -> Result<Self> {
        if self.depth >= self.catalog.max_depth() {
            return Err(ClassError::NestingTooDeep(self.catalog.max_depth()));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self
        })
    }
}

fn binding(class: &ClassDef) -> Result<&TableBinding> {
    class.table().ok_or_else(|| {
        ClassError::InvalidSignature(format!(
            "class `{}` has no table binding",
            class.name()
        ))
    })
}

impl Instance {
    fn require_id(&self) -> Result<i64> {
        self.id().ok_or_else(|| {
            ClassError::InvalidSignature(format!(
                "`{}` instance has no identity; insert it first",
                self.class_name()
            ))
        })
    }

    /// Stored columns and their serialized values, identity excluded.
    fn stored_values(&self, identity: usize) -> (Vec<String>, Vec<SqlValue>) {
        self.class
            .properties()
            .iter()
            .zip(&self.slots)
            .enumerate()
            .filter(|(slot, (property, _))| *slot != identity && property.store)
            .map(|(_, (property, value))| (property.name.clone(), property.save(value)))
            .unzip()
    }

    /// Insert a new row and write the generated identity back.
    pub async fn insert(&mut self, service: &dyn QueryService) -> Result<&mut Self> {
        let table = binding(&self.class)?.clone();
        let (columns, params) = self.stored_values(table.identity);
        let sql = statement::insert(&table.name, &columns);
        debug!(class = self.class_name(), %sql, params = params.len(), "Issuing insert");

        match service.query(&sql, params).await? {
            QueryOutput::Write {
                insert_id: Some(id),
                ..
            } => {
                let id = i64::try_from(id).map_err(|_| {
                    ClassError::UnexpectedResponse(format!("generated identity {id} out of range"))
                })?;
                self.slots[table.identity] = Value::Int(id);
                Ok(self)
            }
            other => Err(ClassError::UnexpectedResponse(format!(
                "insert into `{}` returned no generated identity: {other:?}",
                table.name
            ))),
        }
    }

    /// Write every stored property except the identity to the existing row.
    pub async fn update(&mut self, service: &dyn QueryService) -> Result<&mut Self> {
        let table = binding(&self.class)?.clone();
        let id = self.require_id()?;
        let (columns, mut params) = self.stored_values(table.identity);
        if columns.is_empty() {
            debug!(class = self.class_name(), "Nothing to update");
            return Ok(self);
        }
        params.push(SqlValue::Int(id));

        let sql = statement::update(&table.name, &columns, IDENTITY);
        debug!(class = self.class_name(), %sql, id, "Issuing update");
        let affected = service.query(&sql, params).await?.affected_rows()?;
        if affected == 0 {
            debug!(class = self.class_name(), id, "Update matched no row");
        }
        Ok(self)
    }

    /// Delete the row keyed by identity. Returns the affected row count.
    pub async fn delete(&self, service: &dyn QueryService) -> Result<u64> {
        let table = binding(&self.class)?;
        let id = self.require_id()?;
        let sql = statement::delete(&table.name, IDENTITY);
        debug!(class = self.class_name(), %sql, id, "Issuing delete");
        Ok(service
            .query(&sql, vec![SqlValue::Int(id)])
            .await?
            .affected_rows()?)
    }

    /// Populate the instance from a stored row.
    ///
    /// Returns `None` when no row matches; the instance is then left as it
    /// was. Properties are deserialized in declaration order into a copy of
    /// the instance, which replaces it only once all of them succeeded.
    pub async fn load(
        &mut self,
        selector: impl Into<Selector>,
        service: &dyn QueryService,
    ) -> Result<Option<&mut Self>> {
        let catalog = Arc::clone(&self.catalog);
        let ctx = LoadContext {
            service,
            catalog: &catalog,
            depth: 0,
        };

        let row = match selector.into() {
            Selector::Id(id) => {
                let table = binding(&self.class)?;
                select_row(&self.class, &table.name, IDENTITY, SqlValue::Int(id), ctx).await?
            }
            Selector::Key(key) => {
                let table = binding(&self.class)?;
                match (&table.alternate_lookup, key.trim().parse::<i64>()) {
                    (Some(lookup), _) => {
                        select_row(&self.class, &table.name, lookup, SqlValue::Text(key), ctx)
                            .await?
                    }
                    (None, Ok(id)) => {
                        select_row(&self.class, &table.name, IDENTITY, SqlValue::Int(id), ctx)
                            .await?
                    }
                    (None, Err(_)) => {
                        return Err(ClassError::InvalidSignature(format!(
                            "`{}` has no alternate lookup property for key `{key}`",
                            self.class_name()
                        )))
                    }
                }
            }
            Selector::Row(row) => Some(row),
            Selector::Url(locator) => {
                let fetcher = catalog.fetcher().ok_or_else(|| {
                    ClassError::InvalidSignature(format!(
                        "no fetcher configured to load `{locator}`"
                    ))
                })?;
                debug!(class = self.class_name(), %locator, "Fetching payload");
                let json = fetcher.fetch_json(&locator).await?;
                let record = wire::decode_fields(&self.class, &json, &catalog)?;
                let mut scratch = self.clone();
                for (name, value) in record.fields {
                    scratch.set(&name, value)?;
                }
                *self = scratch;
                return Ok(Some(self));
            }
        };

        let Some(row) = row else {
            debug!(class = self.class_name(), "No row matched");
            return Ok(None);
        };
        let mut scratch = self.clone();
        populate(&mut scratch, &row, ctx).await?;
        *self = scratch;
        Ok(Some(self))
    }
}

async fn select_row(
    class: &ClassDef,
    table: &str,
    column: &str,
    key: SqlValue,
    ctx: LoadContext<'_>,
) -> Result<Option<SqlRow>> {
    let sql = statement::select(table, &class.stored_columns(), column);
    debug!(class = class.name(), %sql, "Issuing lookup");
    let mut rows = ctx.service.query(&sql, vec![key]).await?.into_rows()?;
    if rows.len() > 1 {
        warn!(class = class.name(), rows = rows.len(), "Lookup matched several rows, using the first");
    }
    Ok(if rows.is_empty() {
        None
    } else {
        Some(rows.swap_remove(0))
    })
}

/// Deserialize every stored property present in `row`, in slot order.
fn populate<'a>(
    instance: &'a mut Instance,
    row: &'a SqlRow,
    ctx: LoadContext<'a>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let properties = instance.class.properties().to_vec();
        for (slot, property) in properties.into_iter().enumerate() {
            if !property.store {
                continue;
            }
            let Some(raw) = row.get(&property.name) else {
                continue;
            };
            instance.slots[slot] = load_property(property, raw.clone(), ctx).await?;
        }
        Ok(())
    }
    .boxed()
}

fn load_property(
    property: Arc<Property>,
    raw: SqlValue,
    ctx: LoadContext<'_>,
) -> BoxFuture<'_, Result<Value>> {
    async move {
        if property.has_load_transform() || raw.is_null() {
            return Ok(property.restore(&raw)?);
        }
        match property.descriptor().native {
            Native::Object => {
                let json = stored_json(&property, &raw)?;
                load_object(property.label(), &property, json, ctx).await
            }
            Native::Array if property.descriptor().key.loads_objects() => {
                let json = stored_json(&property, &raw)?;
                load_object_array(&property, json, ctx).await
            }
            _ => Ok(property.restore(&raw)?),
        }
    }
    .boxed()
}

fn stored_json(property: &Property, raw: &SqlValue) -> Result<serde_json::Value> {
    let text = raw.as_text().ok_or_else(|| {
        ClassError::Wire(format!(
            "{}: stored reference is not text",
            property.label()
        ))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        ClassError::Wire(format!("{}: invalid stored reference: {e}", property.label()))
    })
}

/// Null for a reference that resolves to nothing, when `target` allows it.
fn unresolved(label: &str, target: &Property, received: &str) -> Result<Value> {
    if target.allow_null {
        Ok(Value::Null)
    } else {
        Err(TypeMismatch::new(label, target.expected(), received).into())
    }
}

/// Resolve one stored reference to an instance. `target` is the property,
/// or the element definition for arrays.
fn load_object<'a>(
    label: String,
    target: &'a Property,
    json: serde_json::Value,
    ctx: LoadContext<'a>,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        if json.is_null() {
            return unresolved(&label, target, "stored null");
        }
        let stored = StoredRef::parse(&json)
            .ok_or_else(|| ClassError::Wire(format!("{label}: unrecognized reference {json}")))?;
        let factory = ctx.catalog.factory(stored.class())?;
        check_constraint(&label, target.class_constraint(), &factory)?;

        match stored {
            StoredRef::Inline { fields, .. } => {
                let instance = factory.create(Seed::Json(fields))?;
                Ok(Value::Object(Box::new(instance)))
            }
            StoredRef::Id { id: None, class } => {
                warn!(property = %label, %class, "Stored reference has no identity");
                unresolved(&label, target, &format!("reference to unsaved {class}"))
            }
            StoredRef::Id { id: Some(id), .. } => {
                let table = binding(factory.class())?;
                let row =
                    select_row(factory.class(), &table.name, IDENTITY, SqlValue::Int(id), ctx)
                        .await?;
                match row {
                    Some(row) => {
                        let instance = materialize(&factory, &row, ctx.nested()?).await?;
                        Ok(Value::Object(Box::new(instance)))
                    }
                    None => {
                        debug!(property = %label, class = factory.name(), id, "Referenced row is gone");
                        unresolved(&label, target, &format!("missing {} row {id}", factory.name()))
                    }
                }
            }
        }
    }
    .boxed()
}

fn check_constraint(label: &str, constraint: Option<&str>, factory: &ClassFactory) -> Result<()> {
    match constraint {
        Some(expected) if !factory.class().is_a(expected) => Err(TypeMismatch::new(
            label,
            format!("instance of {expected}"),
            format!("instance of {}", factory.name()),
        )
        .into()),
        _ => Ok(()),
    }
}

/// Resolve a stored list of references. When every entry references a row
/// of the same class, the rows are fetched with a single lookup.
fn load_object_array<'a>(
    property: &'a Property,
    json: serde_json::Value,
    ctx: LoadContext<'a>,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        let serde_json::Value::Array(items) = json else {
            return Err(ClassError::Wire(format!(
                "{}: stored value is not a list of references",
                property.label()
            )));
        };
        let label = property.label();
        let element = property.element().ok_or_else(|| {
            ClassError::InvalidSignature(format!("`{}` is not an array property", property.name))
        })?;

        if let Some((class, ids)) = same_class_ids(&items) {
            let factory = ctx.catalog.factory(&class)?;
            check_constraint(&label, element.class_constraint(), &factory)?;
            if let Some(table) = factory.class().table() {
                let nested = ctx.nested()?;
                let rows = select_many(factory.class(), table, &ids, ctx).await?;
                let mut values = Vec::with_capacity(ids.len());
                for (index, id) in ids.into_iter().enumerate() {
                    values.push(match rows.get(&id) {
                        Some(row) => Value::Object(Box::new(materialize(&factory, row, nested).await?)),
                        None => {
                            debug!(property = %label, class = factory.name(), id, "Referenced row is gone");
                            unresolved(
                                &format!("{label}[{index}]"),
                                element,
                                &format!("missing {} row {id}", factory.name()),
                            )?
                        }
                    });
                }
                return Ok(Value::Array(values));
            }
        }

        let mut values = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            values.push(load_object(format!("{label}[{index}]"), element, item, ctx).await?);
        }
        Ok(Value::Array(values))
    }
    .boxed()
}

/// Class and identities when every entry is an identity reference to the
/// same class.
fn same_class_ids(items: &[serde_json::Value]) -> Option<(String, Vec<i64>)> {
    let mut class: Option<String> = None;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match StoredRef::parse(item)? {
            StoredRef::Id {
                class: item_class,
                id: Some(id),
            } => {
                match &class {
                    Some(class) if *class != item_class => return None,
                    Some(_) => {}
                    None => class = Some(item_class),
                }
                ids.push(id);
            }
            _ => return None,
        }
    }
    class.map(|class| (class, ids))
}

async fn select_many(
    class: &ClassDef,
    table: &TableBinding,
    ids: &[i64],
    ctx: LoadContext<'_>,
) -> Result<HashMap<i64, SqlRow>> {
    let mut keys: Vec<i64> = Vec::with_capacity(ids.len());
    for id in ids {
        if !keys.contains(id) {
            keys.push(*id);
        }
    }
    let sql = statement::select_in(&table.name, &class.stored_columns(), IDENTITY, keys.len());
    debug!(class = class.name(), %sql, keys = keys.len(), "Issuing batched lookup");
    let params = keys.into_iter().map(SqlValue::Int).collect();
    let rows = ctx.service.query(&sql, params).await?.into_rows()?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get(IDENTITY).and_then(SqlValue::as_i64)?;
            Some((id, row))
        })
        .collect())
}

/// Build an instance of `factory`'s class from a stored row.
fn materialize<'a>(
    factory: &'a ClassFactory,
    row: &'a SqlRow,
    ctx: LoadContext<'a>,
) -> BoxFuture<'a, Result<Instance>> {
    async move {
        let mut instance = factory.placeholder();
        populate(&mut instance, row, ctx).await?;
        Ok(instance)
    }
    .boxed()
}
