//! In-memory [`QueryService`].
//!
//! Understands exactly the statements the persistence methods and the DDL
//! generator emit: single-table `INSERT`, `UPDATE`, `DELETE`, and `SELECT`
//! keyed by one column (`= ?` or `IN (?, ...)`), plus `CREATE TABLE`.
//! Tables are created on first insert. Every statement is recorded so tests
//! can assert on what was issued.

use crate::property::IDENTITY;
use crate::service::{QueryOutput, QueryService};
use crate::value::{SqlRow, SqlValue};
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<SqlRow>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    log: Vec<(String, Vec<SqlValue>)>,
    fail_next: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<State>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements issued so far, oldest first.
    pub async fn statements(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Statements issued so far with their parameters.
    pub async fn calls(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.lock().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log.clear();
    }

    /// Make the next query fail with `message`.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().await.fail_next = Some(message.into());
    }

    /// Current rows of a table, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<SqlRow> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    pub async fn has_table(&self, table: &str) -> bool {
        self.state.lock().await.tables.contains_key(table)
    }
}

#[async_trait::async_trait]
impl QueryService for MemoryService {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryOutput> {
        let mut state = self.state.lock().await;
        state.log.push((sql.to_string(), params.clone()));
        if let Some(message) = state.fail_next.take() {
            bail!(message);
        }
        debug!(%sql, params = params.len(), "Executing in memory");

        let statement = Statement::parse(sql)?;
        statement.execute(&mut state.tables, params)
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.snapshot.is_some() {
            bail!("transaction already open");
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| anyhow!("no open transaction to commit"))
    }

    async fn abort(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| anyhow!("no open transaction to roll back"))?;
        state.tables = snapshot;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Statement {
    Create {
        table: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
    },
    Update {
        table: String,
        columns: Vec<String>,
        key: String,
    },
    Select {
        table: String,
        columns: Vec<String>,
        key: String,
    },
    Delete {
        table: String,
        key: String,
    },
}

impl Statement {
    fn parse(sql: &str) -> Result<Self> {
        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let mut identifiers = quoted_identifiers(sql)?;
        let unsupported = || anyhow!("unsupported statement: {sql}");

        let statement = match verb.as_str() {
            "CREATE" => Self::Create {
                table: identifiers.into_iter().next().ok_or_else(unsupported)?,
            },
            "INSERT" => {
                if identifiers.is_empty() {
                    return Err(unsupported());
                }
                let table = identifiers.remove(0);
                Self::Insert {
                    table,
                    columns: identifiers,
                }
            }
            "UPDATE" => {
                if identifiers.len() < 3 {
                    return Err(unsupported());
                }
                let table = identifiers.remove(0);
                let key = identifiers.pop().ok_or_else(unsupported)?;
                Self::Update {
                    table,
                    columns: identifiers,
                    key,
                }
            }
            "SELECT" => {
                let key = identifiers.pop().ok_or_else(unsupported)?;
                let table = identifiers.pop().ok_or_else(unsupported)?;
                Self::Select {
                    table,
                    columns: identifiers,
                    key,
                }
            }
            "DELETE" => {
                if identifiers.len() != 2 {
                    return Err(unsupported());
                }
                let key = identifiers.remove(1);
                Self::Delete {
                    table: identifiers.remove(0),
                    key,
                }
            }
            _ => return Err(unsupported()),
        };
        Ok(statement)
    }

    fn execute(
        self,
        tables: &mut BTreeMap<String, Table>,
        params: Vec<SqlValue>,
    ) -> Result<QueryOutput> {
        match self {
            Self::Create { table } => {
                tables.entry(table).or_default();
                Ok(write(0, None))
            }
            Self::Insert { table, columns } => {
                if columns.len() != params.len() {
                    bail!(
                        "insert into `{table}` has {} columns but {} parameters",
                        columns.len(),
                        params.len()
                    );
                }
                let table = tables.entry(table).or_default();
                let mut row: SqlRow = columns.into_iter().zip(params).collect();
                let id = match row.get(IDENTITY).and_then(SqlValue::as_i64) {
                    Some(id) if id > 0 => id as u64,
                    _ => table.next_id + 1,
                };
                table.next_id = table.next_id.max(id);
                row.set(IDENTITY, SqlValue::Int(id as i64));
                table.rows.push(row);
                Ok(write(1, Some(id)))
            }
            Self::Update {
                table,
                columns,
                key,
            } => {
                let mut params = params;
                let key_value = params
                    .pop()
                    .ok_or_else(|| anyhow!("update of `{table}` without a key parameter"))?;
                if columns.len() != params.len() {
                    bail!("update of `{table}` has mismatched parameters");
                }
                let rows = &mut existing(tables, &table)?.rows;
                let mut affected = 0;
                for row in rows.iter_mut().filter(|row| matches(row, &key, &[&key_value])) {
                    for (column, value) in columns.iter().zip(&params) {
                        row.set(column, value.clone());
                    }
                    affected += 1;
                }
                Ok(write(affected, None))
            }
            Self::Select {
                table,
                columns,
                key,
            } => {
                let keys: Vec<&SqlValue> = params.iter().collect();
                let rows = existing(tables, &table)?
                    .rows
                    .iter()
                    .filter(|row| matches(row, &key, &keys))
                    .map(|row| {
                        columns
                            .iter()
                            .map(|column| {
                                let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
                                (column.clone(), value)
                            })
                            .collect()
                    })
                    .collect();
                Ok(QueryOutput::Rows(rows))
            }
            Self::Delete { table, key } => {
                let key_value = params
                    .first()
                    .ok_or_else(|| anyhow!("delete from `{table}` without a key parameter"))?;
                let rows = &mut existing(tables, &table)?.rows;
                let before = rows.len();
                rows.retain(|row| !matches(row, &key, &[key_value]));
                Ok(write((before - rows.len()) as u64, None))
            }
        }
    }
}

fn existing<'a>(tables: &'a mut BTreeMap<String, Table>, table: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(table)
        .ok_or_else(|| anyhow!("table `{table}` does not exist"))
}

fn matches(row: &SqlRow, column: &str, keys: &[&SqlValue]) -> bool {
    row.get(column)
        .is_some_and(|value| keys.iter().any(|key| value.loosely_equals(key)))
}

fn write(affected_rows: u64, insert_id: Option<u64>) -> QueryOutput {
    QueryOutput::Write {
        affected_rows,
        insert_id,
    }
}

/// Backtick-quoted identifiers in order of appearance. Doubled backticks
/// inside an identifier stand for one backtick.
fn quoted_identifiers(sql: &str) -> Result<Vec<String>> {
    let mut identifiers = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '`' {
            continue;
        }
        let mut identifier = String::new();
        loop {
            match chars.next() {
                Some('`') if chars.peek() == Some(&'`') => {
                    chars.next();
                    identifier.push('`');
                }
                Some('`') => break,
                Some(c) => identifier.push(c),
                None => bail!("unterminated identifier in: {sql}"),
            }
        }
        identifiers.push(identifier);
    }
    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_generated_statements() {
        assert_eq!(
            Statement::parse(&statement::insert("items", &cols(&["label"]))).unwrap(),
            Statement::Insert {
                table: "items".into(),
                columns: cols(&["label"])
            }
        );
        assert_eq!(
            Statement::parse(&statement::select_in("items", &cols(&["id", "label"]), "id", 2))
                .unwrap(),
            Statement::Select {
                table: "items".into(),
                columns: cols(&["id", "label"]),
                key: "id".into()
            }
        );
        assert_eq!(
            Statement::parse(&statement::update("odd`name", &cols(&["a", "b"]), "id")).unwrap(),
            Statement::Update {
                table: "odd`name".into(),
                columns: cols(&["a", "b"]),
                key: "id".into()
            }
        );
        assert!(Statement::parse("DROP TABLE `items`").is_err());
        assert!(Statement::parse("SELECT `a FROM").is_err());
    }

    #[tokio::test]
    async fn test_insert_select_update_delete() {
        let service = MemoryService::new();
        let insert = statement::insert("items", &cols(&["label"]));
        let first = service.query(&insert, vec!["bolt".into()]).await.unwrap();
        assert_eq!(
            first,
            QueryOutput::Write {
                affected_rows: 1,
                insert_id: Some(1)
            }
        );
        service.query(&insert, vec!["nut".into()]).await.unwrap();

        let select = statement::select("items", &cols(&["id", "label"]), "id");
        let rows = service
            .query(&select, vec![SqlValue::Text("2".into())])
            .await
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows, vec![SqlRow::new().with("id", 2).with("label", "nut")]);

        let update = statement::update("items", &cols(&["label"]), "id");
        let output = service
            .query(&update, vec!["washer".into(), 1.into()])
            .await
            .unwrap();
        assert_eq!(output.affected_rows().unwrap(), 1);

        let delete = statement::delete("items", "id");
        let output = service.query(&delete, vec![2.into()]).await.unwrap();
        assert_eq!(output.affected_rows().unwrap(), 1);

        let rows = service.rows("items").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("label"), Some(&SqlValue::Text("washer".into())));
        assert_eq!(service.statements().await.len(), 5);
    }

    #[tokio::test]
    async fn test_transactions_restore_snapshot() {
        let service = MemoryService::new();
        let insert = statement::insert("items", &cols(&["label"]));
        service.query(&insert, vec!["kept".into()]).await.unwrap();

        service.begin().await.unwrap();
        assert!(service.begin().await.is_err());
        service.query(&insert, vec!["dropped".into()]).await.unwrap();
        service.abort().await.unwrap();
        assert_eq!(service.rows("items").await.len(), 1);

        service.begin().await.unwrap();
        service.query(&insert, vec!["committed".into()]).await.unwrap();
        service.commit().await.unwrap();
        assert_eq!(service.rows("items").await.len(), 2);
        assert!(service.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_failures() {
        let service = MemoryService::new();
        service.fail_next("connection reset").await;
        let err = service
            .query(&statement::delete("items", "id"), vec![1.into()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");

        let err = service
            .query(&statement::delete("items", "id"), vec![1.into()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        service
            .query("CREATE TABLE IF NOT EXISTS `items` (`id` INT)", vec![])
            .await
            .unwrap();
        assert!(service.has_table("items").await);
    }
}
