//! MySQL DDL generation for synthesized classes.
//!
//! The column list mirrors the parent-first property order of the class,
//! skipping properties that are not stored. The identity property is always
//! `PRIMARY KEY AUTO_INCREMENT NOT NULL`; named indexes are appended after
//! the columns.

use classforge_core::statement::quote;
use classforge_core::{ClassDef, IndexConfig, IndexKind, Kind, Property, QueryService};
use thiserror::Error;
use tracing::info;

/// Length of function-kind columns, which hold handler names.
pub const HANDLER_COLUMN_LENGTH: u32 = 64;

#[derive(Debug, Error)]
pub enum DdlError {
    #[error("class `{0}` has no table binding")]
    NoTable(String),
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

/// Trait for generating DDL strings.
pub trait ToDdl {
    /// Column type of a property, with length and decimals applied.
    fn to_ddl(&self, property: &Property) -> String;

    /// Complete `CREATE TABLE IF NOT EXISTS` statement for a table-bound class.
    fn to_create_table(&self, class: &ClassDef) -> Result<String, DdlError>;
}

/// MySQL DDL generator.
pub struct MySqlDdl;

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToDdl for MySqlDdl {
    fn to_ddl(&self, property: &Property) -> String {
        let descriptor = property.descriptor();
        if descriptor.key.is_array() {
            return descriptor.column_type.to_string();
        }

        match descriptor.kind() {
            // Boolean - MySQL uses TINYINT(1)
            Kind::Boolean => "TINYINT(1)".to_string(),
            Kind::Enum => format!("ENUM({})", quoted_list(&property.values)),
            Kind::Set if property.values.is_empty() => "TEXT".to_string(),
            Kind::Set => format!("SET({})", quoted_list(&property.values)),
            Kind::Function => format!(
                "VARCHAR({})",
                property.length.unwrap_or(HANDLER_COLUMN_LENGTH)
            ),
            // Fractional seconds follow the precision values are stored at.
            Kind::Time | Kind::DateTime | Kind::Timestamp => {
                format!("{}({})", descriptor.column_type, property.fsp())
            }
            _ => match (property.width(), property.decimals) {
                (Some(length), Some(decimals)) => {
                    format!("{}({length},{decimals})", descriptor.column_type)
                }
                (Some(length), None) => format!("{}({length})", descriptor.column_type),
                _ => descriptor.column_type.to_string(),
            },
        }
    }

    fn to_create_table(&self, class: &ClassDef) -> Result<String, DdlError> {
        let table = class
            .table()
            .ok_or_else(|| DdlError::NoTable(class.name().to_string()))?;

        let mut definitions: Vec<String> = class
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, property)| property.store)
            .map(|(slot, property)| self.column_definition(property, slot == table.identity))
            .collect();
        definitions.extend(class.indexes().iter().map(index_definition));

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote(&table.name),
            definitions.join(",\n  ")
        ))
    }
}

impl MySqlDdl {
    /// One column definition with its modifiers.
    pub fn column_definition(&self, property: &Property, identity: bool) -> String {
        let mut parts = vec![quote(&property.name), self.to_ddl(property)];
        if property.unsigned {
            parts.push("UNSIGNED".to_string());
        }
        if property.zerofill {
            parts.push("ZEROFILL".to_string());
        }
        if identity {
            parts.push("PRIMARY KEY AUTO_INCREMENT NOT NULL".to_string());
            return parts.join(" ");
        }

        if let Some(charset) = &property.charset {
            parts.push(format!("CHARACTER SET {charset}"));
        }
        if let Some(collate) = &property.collate {
            parts.push(format!("COLLATE {collate}"));
        }
        parts.push(if property.allow_null { "NULL" } else { "NOT NULL" }.to_string());
        if property.auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        }
        if property.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(comment) = &property.comment {
            parts.push(format!("COMMENT '{}'", comment.replace('\'', "''")));
        }
        parts.join(" ")
    }
}

fn index_definition(index: &IndexConfig) -> String {
    let method = match index.kind {
        IndexKind::Btree => "BTREE",
        IndexKind::Hash => "HASH",
    };
    let columns = index
        .columns
        .iter()
        .map(|column| quote(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}INDEX {} USING {method} ({columns})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name)
    )
}

/// Create the table of a class through the query service.
pub async fn create_table(class: &ClassDef, service: &dyn QueryService) -> Result<(), DdlError> {
    let sql = MySqlDdl.to_create_table(class)?;
    service.query(&sql, Vec::new()).await?;
    info!(
        class = class.name(),
        table = class.table().map(|t| t.name.as_str()),
        "Created table"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use classforge_core::{synthesize, ClassConfig, PropertyConfig};

    fn property(config: PropertyConfig) -> Property {
        Property::from_config(&config).unwrap()
    }

    #[test]
    fn test_column_types() {
        let ddl = MySqlDdl;
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "boolean"))), "TINYINT(1)");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "varchar").length(40))),
            "VARCHAR(40)"
        );
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "decimal").length(10).decimals(2))),
            "DECIMAL(10,2)"
        );
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "int"))), "INT");
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "datetime"))), "DATETIME(6)");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "timestamp").length(3))),
            "TIMESTAMP(3)"
        );
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "time"))), "TIME(6)");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "time").length(0))),
            "TIME(0)"
        );
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "char"))), "CHAR(255)");
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "binary"))), "BINARY(255)");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "char").length(8))),
            "CHAR(8)"
        );
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "enum").values(["it's", "b"]))),
            "ENUM('it''s', 'b')"
        );
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "set"))), "TEXT");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::new("a", "set").values(["r", "w"]))),
            "SET('r', 'w')"
        );
        assert_eq!(ddl.to_ddl(&property(PropertyConfig::new("a", "function"))), "VARCHAR(64)");
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::array("a", PropertyConfig::element("int")))),
            "MEDIUMTEXT"
        );
        assert_eq!(
            ddl.to_ddl(&property(PropertyConfig::instance_of("a", "Person"))),
            "MEDIUMTEXT"
        );
    }

    #[test]
    fn test_create_table() {
        let factory = synthesize(
            ClassConfig::new("Person")
                .table("people")
                .property(PropertyConfig::new("id", "int").unsigned())
                .property(PropertyConfig::new("email", "varchar").length(64).unique())
                .property(PropertyConfig::new("bio", "text").allow_null(true).comment("free text"))
                .property(PropertyConfig::new("scratch", "text").store(false))
                .index(classforge_core::IndexConfig::new("by_bio", ["bio", "email"]))
                .index(classforge_core::IndexConfig::new("by_email", ["email"]).hash().unique()),
        )
        .unwrap();

        let sql = MySqlDdl.to_create_table(factory.class()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `people` (\n  \
             `id` INT UNSIGNED PRIMARY KEY AUTO_INCREMENT NOT NULL,\n  \
             `email` VARCHAR(64) NOT NULL UNIQUE,\n  \
             `bio` TEXT NULL COMMENT 'free text',\n  \
             INDEX `by_bio` USING BTREE (`bio`, `email`),\n  \
             UNIQUE INDEX `by_email` USING HASH (`email`)\n)"
        );
    }

    #[test]
    fn test_classes_without_table() {
        let factory =
            synthesize(ClassConfig::new("Note").property(PropertyConfig::new("body", "text")))
                .unwrap();
        assert!(matches!(
            MySqlDdl.to_create_table(factory.class()),
            Err(DdlError::NoTable(_))
        ));
    }
}
