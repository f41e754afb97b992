//! Statement text for the persistence methods, MySQL dialect.
//!
//! Identifiers are backtick-quoted and every value travels as a positional
//! `?` parameter. Column order in the text always matches parameter order.

/// Quote an identifier, doubling embedded backticks.
pub fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub fn insert(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        column_list(columns),
        placeholders(columns.len())
    )
}

/// The key parameter comes last.
pub fn update(table: &str, columns: &[String], key: &str) -> String {
    let assignments = columns
        .iter()
        .map(|column| format!("{} = ?", quote(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote(table),
        assignments,
        quote(key)
    )
}

pub fn select(table: &str, columns: &[String], key: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?",
        column_list(columns),
        quote(table),
        quote(key)
    )
}

/// Batched lookup of `count` keys.
pub fn select_in(table: &str, columns: &[String], key: &str, count: usize) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        column_list(columns),
        quote(table),
        quote(key),
        placeholders(count)
    )
}

pub fn delete(table: &str, key: &str) -> String {
    format!("DELETE FROM {} WHERE {} = ?", quote(table), quote(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_statements() {
        let cols = columns(&["label", "tags"]);
        assert_eq!(
            insert("items", &cols),
            "INSERT INTO `items` (`label`, `tags`) VALUES (?, ?)"
        );
        assert_eq!(
            update("items", &cols, "id"),
            "UPDATE `items` SET `label` = ?, `tags` = ? WHERE `id` = ?"
        );
        assert_eq!(
            select("items", &columns(&["id", "label"]), "id"),
            "SELECT `id`, `label` FROM `items` WHERE `id` = ?"
        );
        assert_eq!(
            select_in("items", &columns(&["id"]), "id", 3),
            "SELECT `id` FROM `items` WHERE `id` IN (?, ?, ?)"
        );
        assert_eq!(delete("items", "id"), "DELETE FROM `items` WHERE `id` = ?");
    }

    #[test]
    fn test_quote_escapes_backticks() {
        assert_eq!(quote("odd`name"), "`odd``name`");
        assert_eq!(insert("t", &[]), "INSERT INTO `t` () VALUES ()");
    }
}
