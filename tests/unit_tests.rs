use clap::Parser;
use classforge::{create_table_statements, describe_class, load_catalog, HttpFetcher, SchemaOpts};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = r#"
classes:
  - class_name: Person
    table_name: people
    properties:
      - { name: id, type: int }
      - { name: name, type: varchar, length: 32 }
      - { name: nickname, type: varchar, length: 32, store: false }
  - class_name: Worker
    extends: Person
    table_name: workers
    properties:
      - { name: shift, type: enum, values: [day, night] }
  - class_name: Note
    properties:
      - { name: body, type: text }
"#;

fn schema_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn opts(file: &tempfile::NamedTempFile) -> SchemaOpts {
    SchemaOpts {
        schema: file.path().to_path_buf(),
        max_depth: 4,
    }
}

#[test]
fn test_schema_opts_parsing() {
    let opts = SchemaOpts::try_parse_from(["classforge", "--schema", "classes.yaml"]).unwrap();
    assert_eq!(opts.schema.to_str(), Some("classes.yaml"));
    assert_eq!(opts.max_depth, 16);

    let opts = SchemaOpts::try_parse_from([
        "classforge",
        "--schema",
        "classes.yaml",
        "--max-depth",
        "3",
    ])
    .unwrap();
    assert_eq!(opts.max_depth, 3);
}

#[test]
fn test_load_catalog() {
    let file = schema_file(SCHEMA);
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(1)).unwrap());
    let catalog = load_catalog(&opts(&file), Some(fetcher)).unwrap();

    assert_eq!(catalog.class_names(), ["Person", "Worker", "Note"]);
    assert_eq!(catalog.max_depth(), 4);
    assert!(catalog.fetcher().is_some());
}

#[test]
fn test_describe_class() {
    let file = schema_file(SCHEMA);
    let catalog = load_catalog(&opts(&file), None).unwrap();
    let summary = describe_class(catalog.class("Worker").unwrap());

    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines[0], "Worker extends Person (table `workers`)");
    assert!(lines[1].starts_with("  id: int"));
    assert!(lines[1].ends_with(", from Person"));
    assert!(lines[3].contains("not stored"));
    assert_eq!(lines[4], "  shift: enum (day, night)");
}

#[test]
fn test_create_table_statements() {
    let file = schema_file(SCHEMA);
    let catalog = load_catalog(&opts(&file), None).unwrap();

    let all = create_table_statements(&catalog, None).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].starts_with("CREATE TABLE IF NOT EXISTS `people`"));
    assert!(all[1].starts_with("CREATE TABLE IF NOT EXISTS `workers`"));
    assert!(!all[0].contains("nickname"));

    let one = create_table_statements(&catalog, Some("Worker")).unwrap();
    assert_eq!(one, vec![all[1].clone()]);

    let err = create_table_statements(&catalog, Some("Ghost")).unwrap_err();
    assert!(err.to_string().contains("Ghost"));
    assert!(create_table_statements(&catalog, Some("Note")).is_err());
}

#[test]
fn test_invalid_schema_reports_file() {
    let file = schema_file(
        r#"
classes:
  - class_name: Broken
    properties:
      - { name: code, type: varchar }
"#,
    );
    let err = load_catalog(&opts(&file), None).unwrap_err();
    assert!(err.to_string().starts_with("Invalid schema in"));

    let missing = SchemaOpts {
        schema: file.path().with_extension("missing"),
        max_depth: 4,
    };
    let err = load_catalog(&missing, None).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read schema file"));
}
