//! In-place mutation of array properties.
//!
//! An [`ArrayHandle`] borrows one array slot of an instance. Every element
//! it adds goes through the element rule used by wholesale assignment, so
//! an array property never holds an element the setter would have rejected.
//! Operations that add several elements are all-or-nothing.

use crate::class::Catalog;
use crate::coerce::at_element;
use crate::error::{ClassError, Result};
use crate::property::Property;
use crate::value::Value;
use std::mem;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

#[derive(Debug)]
pub struct ArrayHandle<'a> {
    property: Arc<Property>,
    catalog: &'a Arc<Catalog>,
    slot: &'a mut Value,
}

impl<'a> ArrayHandle<'a> {
    pub(crate) fn new(
        property: Arc<Property>,
        catalog: &'a Arc<Catalog>,
        slot: &'a mut Value,
    ) -> Self {
        Self {
            property,
            catalog,
            slot,
        }
    }

    fn items(&self) -> &[Value] {
        self.slot.as_array().unwrap_or(&[])
    }

    /// Take the elements out of the slot; a null slot becomes empty.
    fn take(&mut self) -> Vec<Value> {
        match mem::take(self.slot) {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    fn coerce(&self, value: Value, index: usize) -> Result<Value> {
        let element = self.property.element().ok_or_else(|| {
            ClassError::InvalidSignature(format!("`{}` is not an array property", self.property.name))
        })?;
        element
            .coerce(value, self.catalog)
            .map_err(|err| at_element(err, &self.property.label(), index).into())
    }

    fn out_of_range(&self, index: usize) -> ClassError {
        ClassError::InvalidSignature(format!(
            "index {index} out of range for `{}` of length {}",
            self.property.name,
            self.len()
        ))
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items().get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items().iter()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items().to_vec()
    }

    /// Append one element.
    pub fn push(&mut self, value: impl Into<Value>) -> Result<&mut Self> {
        let value = self.coerce(value.into(), self.len())?;
        let mut items = self.take();
        items.push(value);
        *self.slot = Value::Array(items);
        Ok(self)
    }

    /// Insert one element at the front.
    pub fn prepend(&mut self, value: impl Into<Value>) -> Result<&mut Self> {
        self.insert(0, value)
    }

    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<&mut Self> {
        if index > self.len() {
            return Err(self.out_of_range(index));
        }
        let value = self.coerce(value.into(), index)?;
        let mut items = self.take();
        items.insert(index, value);
        *self.slot = Value::Array(items);
        Ok(self)
    }

    /// Replace the element at `index`.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<&mut Self> {
        if index >= self.len() {
            return Err(self.out_of_range(index));
        }
        let value = self.coerce(value.into(), index)?;
        let mut items = self.take();
        items[index] = value;
        *self.slot = Value::Array(items);
        Ok(self)
    }

    /// Append several elements. Nothing is appended when any is rejected.
    pub fn extend<I, V>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let start = self.len();
        let coerced = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| self.coerce(value.into(), start + offset))
            .collect::<Result<Vec<_>>>()?;
        let mut items = self.take();
        items.extend(coerced);
        *self.slot = Value::Array(items);
        Ok(self)
    }

    /// Overwrite a range with copies of `value`. The range is clamped to the
    /// current length, so filling never grows the array.
    pub fn fill(&mut self, value: impl Into<Value>, range: impl RangeBounds<usize>) -> Result<&mut Self> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => len,
        }
        .min(len);
        if start >= end {
            return Ok(self);
        }

        let value = self.coerce(value.into(), start)?;
        let mut items = self.take();
        for item in &mut items[start..end] {
            *item = value.clone();
        }
        *self.slot = Value::Array(items);
        Ok(self)
    }

    /// Remove the last element. A null slot stays null.
    pub fn pop(&mut self) -> Option<Value> {
        match &mut *self.slot {
            Value::Array(items) => items.pop(),
            _ => None,
        }
    }

    pub fn remove(&mut self, index: usize) -> Result<Value> {
        if index >= self.len() {
            return Err(self.out_of_range(index));
        }
        let mut items = self.take();
        let removed = items.remove(index);
        *self.slot = Value::Array(items);
        Ok(removed)
    }

    /// Remove every element. A null slot stays null.
    pub fn clear(&mut self) {
        if let Value::Array(items) = &mut *self.slot {
            items.clear();
        }
    }
}
