//! MySQL support for classforge.
//!
//! - [`ddl`] - `CREATE TABLE` generation from synthesized classes
//! - [`forward`] / [`reverse`] - conversions between storage values and `mysql_async` values
//! - [`service`] - a [`classforge_core::QueryService`] over one MySQL connection

pub mod ddl;
pub mod forward;
pub mod reverse;
pub mod service;

pub use ddl::{create_table, DdlError, MySqlDdl, ToDdl, HANDLER_COLUMN_LENGTH};
pub use forward::{to_params, MySqlValue};
pub use reverse::{row_to_sql_row, to_sql_value, ConversionError};
pub use service::{sanitize_connection_string, MySqlService};
