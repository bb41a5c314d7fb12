use keystone::discovery::{Cardinality, Provenance, RelationshipKey};
use keystone::metadata::{
    ColumnMetadataReader, ColumnProfile, DeclaredForeignKey, MetadataError, SchemaSnapshot,
};
use keystone::store::{RejectionRecord, RelationshipRecord, RelationshipStore, SqliteStore};
use tempfile::TempDir;
use uuid::Uuid;

fn ids() -> (Uuid, Uuid) {
    (Uuid::new_v4(), Uuid::new_v4())
}

fn relationship(
    project_id: Uuid,
    datasource_id: Uuid,
    key: RelationshipKey,
    confidence: f64,
) -> RelationshipRecord {
    RelationshipRecord {
        project_id,
        datasource_id,
        key,
        cardinality: Cardinality::ManyToOne,
        source_role: Some("owner".to_string()),
        provenance: Provenance::OracleInference,
        confidence,
        reasoning: Some("orders reference users".to_string()),
    }
}

fn sample_schema() -> SchemaSnapshot {
    let mut id = ColumnProfile::new("users", "id", "bigint");
    id.is_primary_key = true;
    id.sample_values = vec!["1".to_string(), "2".to_string()];
    SchemaSnapshot {
        columns: vec![id, ColumnProfile::new("orders", "user_id", "bigint")],
        foreign_keys: vec![DeclaredForeignKey::single(
            "fk_orders_user",
            "orders",
            "user_id",
            "users",
            "id",
        )],
    }
}

#[tokio::test]
async fn test_schema_round_trip_keeps_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    let schema = sample_schema();

    store.save_schema(project, datasource, &schema).unwrap();
    let loaded = store.load_schema(project, datasource).await.unwrap();

    assert_eq!(loaded, schema);
}

#[tokio::test]
async fn test_save_schema_replaces_previous_snapshot() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    store.save_schema(project, datasource, &sample_schema()).unwrap();

    let replacement = SchemaSnapshot {
        columns: vec![ColumnProfile::new("invoices", "id", "uuid")],
        foreign_keys: vec![],
    };
    store.save_schema(project, datasource, &replacement).unwrap();

    let loaded = store.load_schema(project, datasource).await.unwrap();
    assert_eq!(loaded, replacement);
}

#[tokio::test]
async fn test_unknown_datasource_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    store.save_schema(project, datasource, &sample_schema()).unwrap();

    let err = store.load_schema(project, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound { .. }));
}

#[tokio::test]
async fn test_upsert_is_case_insensitive() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();

    store
        .upsert_relationship(&relationship(
            project,
            datasource,
            RelationshipKey::new("orders", "user_id", "users", "id"),
            0.8,
        ))
        .await
        .unwrap();
    store
        .upsert_relationship(&relationship(
            project,
            datasource,
            RelationshipKey::new("Orders", "USER_ID", "Users", "Id"),
            0.95,
        ))
        .await
        .unwrap();

    let listed = store.list_relationships(project, datasource).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].confidence, 0.95);
    assert_eq!(
        listed[0].key,
        RelationshipKey::new("orders", "user_id", "users", "id")
    );
    assert_eq!(listed[0].source_role.as_deref(), Some("owner"));
}

#[tokio::test]
async fn test_relationships_are_scoped_by_datasource() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    let other = Uuid::new_v4();

    store
        .upsert_relationship(&relationship(
            project,
            datasource,
            RelationshipKey::new("orders", "user_id", "users", "id"),
            0.9,
        ))
        .await
        .unwrap();

    assert!(store.list_relationships(project, other).await.unwrap().is_empty());
    assert_eq!(
        store
            .list_relationships(project, datasource)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_rejections_are_kept_apart_from_relationships() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    let key = RelationshipKey::new("logs", "id", "events", "id");

    for reason in ["first pass", "second pass"] {
        store
            .record_rejection(&RejectionRecord {
                project_id: project,
                datasource_id: datasource,
                key: key.clone(),
                provenance: Provenance::OracleInference,
                reason: reason.to_string(),
                confidence: None,
            })
            .await
            .unwrap();
    }

    assert!(store
        .list_relationships(project, datasource)
        .await
        .unwrap()
        .is_empty());
    let rejections = store.list_rejections(project, datasource).await.unwrap();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].reason, "second pass");
    assert_eq!(rejections[0].confidence, None);
    assert_eq!(rejections[0].provenance, Provenance::OracleInference);
}

#[tokio::test]
async fn test_outcomes_replace_each_other() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (project, datasource) = ids();
    let key = RelationshipKey::new("orders", "user_id", "users", "id");

    store
        .upsert_relationship(&relationship(project, datasource, key.clone(), 0.9))
        .await
        .unwrap();
    store
        .record_rejection(&RejectionRecord {
            project_id: project,
            datasource_id: datasource,
            key: RelationshipKey::new("ORDERS", "user_id", "users", "ID"),
            provenance: Provenance::OracleInference,
            reason: "no longer plausible".to_string(),
            confidence: Some(0.8),
        })
        .await
        .unwrap();

    assert!(store.list_relationships(project, datasource).await.unwrap().is_empty());
    assert_eq!(store.list_rejections(project, datasource).await.unwrap().len(), 1);

    store
        .upsert_relationship(&relationship(project, datasource, key, 0.95))
        .await
        .unwrap();
    assert_eq!(store.list_relationships(project, datasource).await.unwrap().len(), 1);
    assert!(store.list_rejections(project, datasource).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("keystone.db");
    let (project, datasource) = ids();

    {
        let store = SqliteStore::open(&path).unwrap();
        store.save_schema(project, datasource, &sample_schema()).unwrap();
        let mut record = relationship(
            project,
            datasource,
            RelationshipKey::new("orders", "user_id", "users", "id"),
            1.0,
        );
        record.provenance = Provenance::DbConstraint;
        record.reasoning = None;
        store.upsert_relationship(&record).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let listed = store.list_relationships(project, datasource).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].provenance, Provenance::DbConstraint);
    assert_eq!(listed[0].reasoning, None);
    assert_eq!(
        store.load_schema(project, datasource).await.unwrap(),
        sample_schema()
    );
}
