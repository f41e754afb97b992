//! Integration tests for the persistence methods against the in-memory
//! query service.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use classforge_core::statement;
use classforge_core::{
    Catalog, CatalogBuilder, ClassConfig, ClassError, Fetch, MemoryService, PropertyConfig,
    QueryService, Record, Selector, SqlRow, SqlValue, Value,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn staff() -> Result<Arc<Catalog>> {
    staff_with(CatalogBuilder::new())
}

fn staff_with(builder: CatalogBuilder) -> Result<Arc<Catalog>> {
    Ok(builder
        .register(
            ClassConfig::new("Person")
                .table("people")
                .alternate_lookup("email")
                .property(PropertyConfig::new("id", "int"))
                .property(PropertyConfig::new("name", "varchar").length(32))
                .property(PropertyConfig::new("email", "varchar").length(64)),
        )?
        .register(
            ClassConfig::new("Worker")
                .extends("Person")
                .table("workers")
                .property(PropertyConfig::new("shift", "varchar").length(8)),
        )?
        .register(
            ClassConfig::new("Team")
                .table("teams")
                .property(PropertyConfig::new("id", "int"))
                .property(PropertyConfig::new("name", "varchar").length(32))
                .property(PropertyConfig::instance_of("lead", "Worker"))
                .property(PropertyConfig::array("members", PropertyConfig::element_of("Worker")))
                .property(PropertyConfig::array("crew", PropertyConfig::element_of("Person"))),
        )?
        .build()?)
}

#[tokio::test]
async fn test_insert_update_load_round_trip() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let item = classforge_core::synthesize(
        ClassConfig::new("Item")
            .table("items")
            .property(PropertyConfig::new("id", "integer"))
            .property(PropertyConfig::new("label", "char").length(20)),
    )?;

    let mut instance = item.create(Record::new().field("label", "bolt"))?;
    instance.insert(&service).await?;
    let id = instance.id().expect("insert assigns an identity");
    assert!(id > 0);
    assert_eq!(
        service.statements().await,
        vec!["INSERT INTO `items` (`label`) VALUES (?)".to_string()]
    );

    instance.set("label", "washer")?;
    instance.update(&service).await?;

    let mut fresh = item.new_instance()?;
    assert!(fresh.load(id, &service).await?.is_some());
    assert_eq!(fresh.get("label")?, Value::from("washer"));
    assert_eq!(fresh.id(), Some(id));
    assert_eq!(fresh, instance);
    Ok(())
}

#[tokio::test]
async fn test_load_miss_leaves_instance_untouched() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = staff()?;
    let people = catalog.factory("Person")?;
    people
        .create(Record::new().field("name", "Ada"))?
        .insert(&service)
        .await?;

    let mut instance = people.create(Record::new().field("name", "keep"))?;
    assert!(instance.load(999, &service).await?.is_none());
    assert_eq!(instance.get("name")?, Value::from("keep"));
    assert_eq!(instance.id(), None);
    Ok(())
}

#[tokio::test]
async fn test_unresolved_columns_respect_allow_null() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = staff_with(
        CatalogBuilder::new().register(
            ClassConfig::new("Roster")
                .table("rosters")
                .property(PropertyConfig::new("id", "int"))
                .property(PropertyConfig::new("qty", "int"))
                .property(PropertyConfig::instance_of("boss", "Worker").allow_null(false))
                .property(PropertyConfig::instance_of("deputy", "Worker")),
        )?,
    )?;
    catalog.factory("Worker")?.new_instance()?.insert(&service).await?;
    let rosters = catalog.factory("Roster")?;
    let mut roster = rosters.create(
        Record::new()
            .field("qty", 4)
            .field("boss", Record::tagged("Worker").field("name", "Ada")),
    )?;
    let before = roster.clone();

    let err = roster
        .load(SqlRow::new().with("id", 1).with("qty", SqlValue::Null), &service)
        .await
        .unwrap_err();
    match err {
        ClassError::TypeMismatch(mismatch) => {
            assert_eq!(mismatch.property, "Roster.qty");
            assert_eq!(mismatch.received, "stored null");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(roster, before);

    let gone = SqlValue::from(r#"{"type": "Worker", "id": 42}"#);
    let err = roster
        .load(
            SqlRow::new()
                .with("id", 1)
                .with("qty", 3)
                .with("boss", gone.clone()),
            &service,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClassError::TypeMismatch(_)), "{err}");
    assert_eq!(roster, before);

    assert!(roster
        .load(
            SqlRow::new()
                .with("id", 1)
                .with("qty", 3)
                .with("boss", SqlValue::from(r#"{"type": "Worker", "id": 1}"#))
                .with("deputy", gone),
            &service,
        )
        .await?
        .is_some());
    assert_eq!(roster.get("qty")?, Value::Int(3));
    assert_eq!(roster.get("deputy")?, Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_alternate_lookup_and_delete() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let people = staff()?.factory("Person")?;
    let mut ada = people.create(
        Record::new()
            .field("name", "Ada")
            .field("email", "ada@example.test"),
    )?;
    ada.insert(&service).await?;

    let mut found = people.new_instance()?;
    assert!(found.load("ada@example.test", &service).await?.is_some());
    assert_eq!(found.id(), ada.id());

    assert_eq!(ada.delete(&service).await?, 1);
    let mut gone = people.new_instance()?;
    assert!(gone.load("ada@example.test", &service).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_key_without_alternate_lookup_parses_identity() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let item = classforge_core::synthesize(
        ClassConfig::new("Item")
            .table("items")
            .property(PropertyConfig::new("id", "int"))
            .property(PropertyConfig::new("label", "varchar").length(8)),
    )?;
    item.create(Record::new().field("label", "one"))?
        .insert(&service)
        .await?;

    let mut by_text = item.new_instance()?;
    assert!(by_text.load("1", &service).await?.is_some());
    assert_eq!(by_text.get("label")?, Value::from("one"));

    let err = by_text.load("one", &service).await.unwrap_err();
    assert!(matches!(err, ClassError::InvalidSignature(_)));
    Ok(())
}

#[tokio::test]
async fn test_nested_reference_issues_one_lookup() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = staff()?;
    let workers = catalog.factory("Worker")?;
    for _ in 0..6 {
        workers.new_instance()?.insert(&service).await?;
    }
    let mut ada = workers.create(Record::new().field("name", "Ada").field("shift", "night"))?;
    ada.insert(&service).await?;
    assert_eq!(ada.id(), Some(7));

    let teams = catalog.factory("Team")?;
    let lead_property = teams.class().property("lead").expect("declared");
    let stored = lead_property.save(&Value::from(ada.clone()));
    let reference: serde_json::Value =
        serde_json::from_str(&stored.as_text().expect("references are text"))?;
    assert_eq!(reference, serde_json::json!({"type": "Worker", "id": 7}));

    let mut team = teams.new_instance()?;
    service.clear_log().await;
    let row = SqlRow::new()
        .with("id", 1)
        .with("name", "core")
        .with("lead", stored);
    assert!(team.load(row, &service).await?.is_some());

    let statements = service.statements().await;
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("SELECT `id`, `name`, `email`, `shift` FROM `workers`"));

    let lead = team.get("lead")?;
    let lead = lead.as_object().expect("lead is loaded");
    assert!(lead.is_a("Worker"));
    assert_eq!(lead.id(), Some(7));
    assert_eq!(lead.get("shift")?, Value::from("night"));
    Ok(())
}

#[tokio::test]
async fn test_same_class_arrays_are_batched() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = staff()?;
    let workers = catalog.factory("Worker")?;
    let mut members = Vec::new();
    for name in ["Ada", "Grace", "Edsger"] {
        let mut worker = workers.create(Record::new().field("name", name))?;
        worker.insert(&service).await?;
        members.push(Value::from(worker));
    }

    let teams = catalog.factory("Team")?;
    let mut team = teams.create(Record::new().field("name", "core"))?;
    team.set("members", Value::Array(members))?;
    team.insert(&service).await?;
    service.clear_log().await;

    let mut fresh = teams.new_instance()?;
    assert!(fresh.load(team.id().unwrap_or_default(), &service).await?.is_some());

    let statements = service.statements().await;
    assert_eq!(statements.len(), 2, "{statements:#?}");
    assert!(statements[1].ends_with("WHERE `id` IN (?, ?, ?)"));

    let loaded = fresh.get("members")?;
    let names: Vec<Value> = loaded
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|member| member.as_object()?.get("name").ok())
        .collect();
    assert_eq!(names, vec!["Ada".into(), "Grace".into(), "Edsger".into()]);
    assert_eq!(fresh.get("lead")?, Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_mixed_class_arrays_load_per_element() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = staff()?;
    let mut person = catalog
        .factory("Person")?
        .create(Record::new().field("name", "Barbara"))?;
    person.insert(&service).await?;
    let mut worker = catalog
        .factory("Worker")?
        .create(Record::new().field("name", "Ken"))?;
    worker.insert(&service).await?;

    let teams = catalog.factory("Team")?;
    let mut team = teams.new_instance()?;
    team.set("crew", Value::array([person, worker]))?;
    team.insert(&service).await?;
    service.clear_log().await;

    let mut fresh = teams.new_instance()?;
    assert!(fresh.load(team.id().unwrap_or_default(), &service).await?.is_some());
    let statements = service.statements().await;
    assert_eq!(statements.len(), 3, "{statements:#?}");
    assert!(statements[1].contains("FROM `people`"));
    assert!(statements[2].contains("FROM `workers`"));

    let crew = fresh.get("crew")?;
    let crew = crew.as_array().unwrap_or_default();
    assert!(crew[1].as_object().is_some_and(|member| member.is_a("Worker")));
    Ok(())
}

#[tokio::test]
async fn test_scalar_kinds_survive_storage() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let profile = classforge_core::synthesize(
        ClassConfig::new("Profile")
            .table("profiles")
            .property(PropertyConfig::new("id", "bigint"))
            .property(PropertyConfig::new("born", "datetime"))
            .property(PropertyConfig::new("perms", "set").values(["read", "write"]))
            .property(PropertyConfig::new("avatar", "blob").allow_null(true))
            .property(PropertyConfig::new("active", "boolean"))
            .property(PropertyConfig::array(
                "tags",
                PropertyConfig::element("varchar").length(16),
            ))
            .property(PropertyConfig::array("scores", PropertyConfig::element("int")))
            .property(PropertyConfig::new("scratch", "text").store(false)),
    )?;

    let mut original = profile.create(
        Record::new()
            .field("born", Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap())
            .field("perms", Value::set(["write", "read", "write"]))
            .field("avatar", Value::Bytes(vec![0, 1, 2]))
            .field("active", true)
            .field("tags", Value::array(["a, b", "c"]))
            .field("scores", Value::array([1, 3, 5]))
            .field("scratch", "not stored"),
    )?;
    original.insert(&service).await?;

    let stored = service.rows("profiles").await;
    assert_eq!(stored[0].get("scores"), Some(&SqlValue::Text("1,3,5".into())));
    assert!(stored[0].get("scratch").is_none());

    let mut fresh = profile.new_instance()?;
    assert!(fresh.load(original.id().unwrap_or_default(), &service).await?.is_some());
    for name in ["born", "perms", "avatar", "active", "tags", "scores"] {
        assert_eq!(fresh.get(name)?, original.get(name)?, "{name}");
    }
    assert_eq!(fresh.get("scratch")?, Value::from(""));
    Ok(())
}

#[tokio::test]
async fn test_service_failures_propagate() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let people = staff()?.factory("Person")?;
    let mut ada = people.create(Record::new().field("name", "Ada"))?;

    service.fail_next("connection reset").await;
    let err = ada.insert(&service).await.unwrap_err();
    assert!(matches!(err, ClassError::Service(_)));
    assert_eq!(err.to_string(), "connection reset");
    assert_eq!(ada.id(), None);

    ada.insert(&service).await?;
    service.fail_next("lost connection").await;
    let mut other = people.create(Record::new().field("name", "keep"))?;
    assert!(other.load(ada.id().unwrap_or_default(), &service).await.is_err());
    assert_eq!(other.get("name")?, Value::from("keep"));

    let err = people.new_instance()?.update(&service).await.unwrap_err();
    assert!(matches!(err, ClassError::InvalidSignature(_)));
    Ok(())
}

#[tokio::test]
async fn test_unbound_classes_reject_persistence() -> Result<()> {
    let service = MemoryService::new();
    let note = classforge_core::synthesize(
        ClassConfig::new("Note").property(PropertyConfig::new("body", "text")),
    )?;
    let mut instance = note.new_instance()?;
    assert!(matches!(
        instance.insert(&service).await,
        Err(ClassError::InvalidSignature(_))
    ));
    assert!(matches!(
        instance.load(1, &service).await,
        Err(ClassError::InvalidSignature(_))
    ));

    // A row needs no table.
    let row = SqlRow::new().with("body", "hello");
    assert!(instance.load(row, &service).await?.is_some());
    assert_eq!(instance.get("body")?, Value::from("hello"));
    assert!(service.statements().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_inline_objects_need_no_lookup() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = CatalogBuilder::new()
        .register(
            ClassConfig::new("Address")
                .property(PropertyConfig::new("city", "varchar").length(40)),
        )?
        .register(
            ClassConfig::new("Office")
                .table("offices")
                .property(PropertyConfig::new("id", "int"))
                .property(PropertyConfig::instance_of("address", "Address")),
        )?
        .build()?;
    let offices = catalog.factory("Office")?;
    let mut office = offices.create(
        Record::new().field("address", Record::tagged("Address").field("city", "Leeds")),
    )?;
    office.insert(&service).await?;
    service.clear_log().await;

    let mut fresh = offices.new_instance()?;
    assert!(fresh.load(office.id().unwrap_or_default(), &service).await?.is_some());
    assert_eq!(service.statements().await.len(), 1);
    assert_eq!(fresh, office);
    Ok(())
}

#[tokio::test]
async fn test_cyclic_references_hit_the_depth_guard() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let catalog = CatalogBuilder::new()
        .register(
            ClassConfig::new("Node")
                .table("nodes")
                .property(PropertyConfig::new("id", "int"))
                .property(PropertyConfig::instance_of("next", "Node")),
        )?
        .max_depth(3)
        .build()?;

    let columns = vec!["id".to_string(), "next".to_string()];
    let insert = statement::insert("nodes", &columns);
    service
        .query(&insert, vec![1.into(), r#"{"type":"Node","id":2}"#.into()])
        .await?;
    service
        .query(&insert, vec![2.into(), r#"{"type":"Node","id":1}"#.into()])
        .await?;

    let mut node = catalog.factory("Node")?.new_instance()?;
    let err = node.load(1, &service).await.unwrap_err();
    assert!(matches!(err, ClassError::NestingTooDeep(3)));
    assert_eq!(node.id(), None);
    Ok(())
}

struct StaticFetch(serde_json::Value);

#[async_trait::async_trait]
impl Fetch for StaticFetch {
    async fn fetch_json(&self, locator: &str) -> anyhow::Result<serde_json::Value> {
        anyhow::ensure!(locator.starts_with("https://"), "bad locator {locator}");
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_locator_selector_uses_fetcher() -> Result<()> {
    init_logging();
    let service = MemoryService::new();
    let payload = serde_json::json!({
        "class": "Person",
        "version": 2,
        "fields": {"id": 3, "name": "Remote", "unknown": true}
    });
    let catalog = staff_with(CatalogBuilder::new().fetcher(Arc::new(StaticFetch(payload))))?;
    let people = catalog.factory("Person")?;

    let mut person = people.new_instance()?;
    let selector = Selector::Url("https://example.test/people/3".to_string());
    assert!(person.load(selector, &service).await?.is_some());
    assert_eq!(person.id(), Some(3));
    assert_eq!(person.get("name")?, Value::from("Remote"));
    assert!(service.statements().await.is_empty());

    let err = person
        .load(Selector::Url("ftp://nowhere".to_string()), &service)
        .await
        .unwrap_err();
    assert!(matches!(err, ClassError::Service(_)));

    let mut unconfigured = staff()?.factory("Person")?.new_instance()?;
    let err = unconfigured
        .load(Selector::Url("https://example.test".to_string()), &service)
        .await
        .unwrap_err();
    assert!(matches!(err, ClassError::InvalidSignature(_)));
    Ok(())
}
