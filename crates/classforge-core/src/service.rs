//! Collaborator traits for the persistence methods.
//!
//! The core never opens connections itself. Everything it needs from a
//! database goes through [`QueryService`], and the locator form of `load`
//! goes through [`Fetch`].

use crate::error::ClassError;
use crate::value::{SqlRow, SqlValue};
use anyhow::Result;

/// Result of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Rows returned by a `SELECT`.
    Rows(Vec<SqlRow>),
    /// Metadata of a write statement.
    Write {
        affected_rows: u64,
        insert_id: Option<u64>,
    },
}

impl QueryOutput {
    /// Rows of a select; a write result is an unexpected response.
    pub fn into_rows(self) -> Result<Vec<SqlRow>, ClassError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Write { .. } => Err(ClassError::UnexpectedResponse(
                "expected rows, received write metadata".to_string(),
            )),
        }
    }

    /// Affected row count of a write; rows are an unexpected response.
    pub fn affected_rows(&self) -> Result<u64, ClassError> {
        match self {
            Self::Write { affected_rows, .. } => Ok(*affected_rows),
            Self::Rows(rows) => Err(ClassError::UnexpectedResponse(format!(
                "expected write metadata, received {} rows",
                rows.len()
            ))),
        }
    }
}

/// External query service.
///
/// Implementations are treated as a single logical connection: the
/// persistence methods never issue overlapping queries on one handle.
/// Failures are returned as is and propagate to the caller unchanged.
#[async_trait::async_trait]
pub trait QueryService: Send + Sync {
    /// Execute one statement with positional `?` parameters.
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryOutput>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn abort(&self) -> Result<()>;
}

/// Fetches a JSON payload from an external resource locator.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_json(&self, locator: &str) -> Result<serde_json::Value>;
}
