//! Reverse conversion: MySQL values → SqlValue
//!
//! Temporal values come back in the text forms the core parses: DATE and
//! DATETIME as `YYYY-MM-DD HH:MM:SS.ffffff`, TIME as `[-]HHH:MM:SS[.ffffff]`.
//! Byte payloads that are valid UTF-8 become text; the core turns text back
//! into bytes for binary kinds.

use chrono::NaiveDate;
use classforge_core::{SqlRow, SqlValue};
use mysql_async::{Row, Value};
use thiserror::Error;

/// Error during MySQL value conversion.
#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("Invalid date/time value: {0}")]
    InvalidDateTime(String),
}

/// Convert one MySQL value into its storage form.
pub fn to_sql_value(value: Value) -> Result<SqlValue, ConversionError> {
    let converted = match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => SqlValue::UInt(u),
        Value::Float(f) => SqlValue::Double(f64::from(f)),
        Value::Double(f) => SqlValue::Double(f),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(err) => SqlValue::Bytes(err.into_bytes()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .ok_or_else(|| {
                    ConversionError::InvalidDateTime(format!(
                        "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                    ))
                })?;
            SqlValue::Text(date.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = days * 24 + u32::from(hours);
            let sign = if negative { "-" } else { "" };
            let text = if micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            };
            SqlValue::Text(text)
        }
    };
    Ok(converted)
}

/// Convert a result row, keeping column order.
pub fn row_to_sql_row(mut row: Row) -> Result<SqlRow, ConversionError> {
    let columns = row.columns();
    let mut converted = SqlRow::new();
    for (index, column) in columns.iter().enumerate() {
        let value: Value = row.take(index).unwrap_or(Value::NULL);
        converted.push(column.name_str().into_owned(), to_sql_value(value)?);
    }
    Ok(converted)
}
