//! Core of the classforge class generator.
//!
//! This crate turns declarative class configurations into runtime classes
//! whose properties are typed, validated on every write, and optionally
//! persisted to a SQL table:
//!
//! - [`Kind`] and the static [`Registry`] - closed catalog of property kinds
//! - [`PropertyConfig`] / [`ClassConfig`] - declarative configuration, loadable from YAML
//! - [`CatalogBuilder`] / [`Catalog`] - validated, synthesized classes
//! - [`Instance`] - accessors, initializer, array mutation, wire form
//! - [`QueryService`] - the database collaborator behind `insert`, `update`, `load`, `delete`
//!
//! # Architecture
//!
//! ```text
//! classforge-core (this crate)
//!    │
//!    ├─── classforge-mysql   (DDL, MySQL value conversions, MySQL query service)
//!    │
//!    └─── classforge         (CLI, HTTP fetcher)
//! ```
//!
//! # Example
//!
//! ```rust
//! use classforge_core::{synthesize, ClassConfig, PropertyConfig, Record, Value};
//!
//! let item = synthesize(
//!     ClassConfig::new("Item")
//!         .property(PropertyConfig::new("label", "char").length(4))
//!         .property(PropertyConfig::new("qty", "int")),
//! )
//! .unwrap();
//!
//! let mut instance = item.create(Record::new().field("qty", "3")).unwrap();
//! instance.set("label", "washer").unwrap();
//! assert_eq!(instance.get("label").unwrap(), Value::from("wash"));
//! assert_eq!(instance.get("qty").unwrap(), Value::Int(3));
//! assert!(instance.set("qty", "many").is_err());
//! ```

pub mod array;
pub mod class;
pub mod coerce;
pub mod config;
pub mod error;
pub mod instance;
pub mod kind;
pub mod memory;
pub mod persist;
pub mod property;
pub mod registry;
pub mod service;
pub mod statement;
pub mod storage;
pub mod validate;
pub mod value;
pub mod wire;

// Re-exports for convenience
pub use array::ArrayHandle;
pub use class::{synthesize, Catalog, CatalogBuilder, ClassDef, ClassFactory, Handler, TableBinding};
pub use config::{ClassConfig, IndexConfig, IndexKind, PropertyConfig, SchemaFile};
pub use error::{ClassError, ConfigError, TypeMismatch};
pub use instance::{Access, Instance, Seed};
pub use kind::{Kind, TypeKey};
pub use memory::MemoryService;
pub use persist::Selector;
pub use property::Property;
pub use registry::{registry, Registry, TypeDescriptor};
pub use service::{Fetch, QueryOutput, QueryService};
pub use validate::{validate_class, validate_property};
pub use value::{Record, SqlRow, SqlValue, Value};
