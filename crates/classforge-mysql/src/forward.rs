//! Forward conversion: SqlValue → MySQL value
//!
//! Storage values produced by the persistence methods are already in the
//! shape MySQL expects; text travels as UTF-8 bytes.

use classforge_core::SqlValue;
use mysql_async::{Params, Value};

/// MySQL value wrapper for type-safe conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct MySqlValue(pub Value);

impl MySqlValue {
    /// Get the inner mysql_async::Value.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Get a reference to the inner value.
    pub fn as_inner(&self) -> &Value {
        &self.0
    }
}

impl From<SqlValue> for MySqlValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => MySqlValue(Value::NULL),
            SqlValue::Int(i) => MySqlValue(Value::Int(i)),
            SqlValue::UInt(u) => MySqlValue(Value::UInt(u)),
            SqlValue::Double(f) => MySqlValue(Value::Double(f)),
            SqlValue::Text(s) => MySqlValue(Value::Bytes(s.into_bytes())),
            SqlValue::Bytes(b) => MySqlValue(Value::Bytes(b)),
        }
    }
}

/// Positional parameters for a prepared statement.
pub fn to_params(values: Vec<SqlValue>) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        values
            .into_iter()
            .map(|value| MySqlValue::from(value).into_inner())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(MySqlValue::from(SqlValue::Null).into_inner(), Value::NULL);
        assert_eq!(MySqlValue::from(SqlValue::Int(-4)).into_inner(), Value::Int(-4));
        assert_eq!(MySqlValue::from(SqlValue::UInt(4)).into_inner(), Value::UInt(4));
        assert_eq!(
            MySqlValue::from(SqlValue::Double(1.5)).into_inner(),
            Value::Double(1.5)
        );
        assert_eq!(
            MySqlValue::from(SqlValue::Text("héllo".into())).into_inner(),
            Value::Bytes("héllo".as_bytes().to_vec())
        );
        assert_eq!(
            MySqlValue::from(SqlValue::Bytes(vec![0, 255])).as_inner(),
            &Value::Bytes(vec![0, 255])
        );
    }

    #[test]
    fn test_params() {
        assert_eq!(to_params(Vec::new()), Params::Empty);
        assert_eq!(
            to_params(vec![SqlValue::Int(1), SqlValue::Text("a".into())]),
            Params::Positional(vec![Value::Int(1), Value::Bytes(b"a".to_vec())])
        );
    }
}
