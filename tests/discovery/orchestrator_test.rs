#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use keystone::config::DiscoverySettings;
use keystone::discovery::{
    Cardinality, DiscoveryError, DiscoveryOrchestrator, DiscoveryResult, Provenance,
    ValidatorError,
};
use keystone::metadata::{ColumnProfile, ColumnPurpose, DeclaredForeignKey, SchemaSnapshot};
use keystone::oracle::{render_user_message, OracleError};
use keystone::store::{RelationshipStore, SqliteStore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    project_id: Uuid,
    datasource_id: Uuid,
    store: Arc<SqliteStore>,
    executor: Arc<ScriptedExecutor>,
    connector: Arc<StaticConnector>,
    oracle: Arc<RecordingOracle>,
}

impl Harness {
    fn new(schema: SchemaSnapshot, oracle: RecordingOracle) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (project_id, datasource_id) = (Uuid::new_v4(), Uuid::new_v4());
        store.save_schema(project_id, datasource_id, &schema).unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        Self {
            project_id,
            datasource_id,
            store,
            connector: Arc::new(StaticConnector::new(executor.clone())),
            executor,
            oracle: Arc::new(oracle),
        }
    }

    fn orchestrator(&self, settings: DiscoverySettings) -> DiscoveryOrchestrator {
        DiscoveryOrchestrator::new(
            self.store.clone(),
            self.connector.clone(),
            self.oracle.clone(),
            self.store.clone(),
            settings,
        )
    }

    async fn run(&self) -> Result<DiscoveryResult, DiscoveryError> {
        self.orchestrator(DiscoverySettings::default())
            .discover_relationships(
                &CancellationToken::new(),
                self.project_id,
                self.datasource_id,
                None,
            )
            .await
    }
}

fn clean_stats() -> PairStats {
    PairStats {
        matched_rows: 300,
        matched_source_distinct: 100,
        matched_target_distinct: 100,
        orphans: 0,
        reverse_orphans: 20,
    }
}

#[tokio::test]
async fn test_scenario_a_real_foreign_key_is_persisted() {
    init_tracing();
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "orders.user_id -> users.id",
            verdict_json(true, 0.95, "N:1", "every order belongs to a user"),
        )]),
    );
    h.executor
        .with_pair_stats("orders", "user_id", "users", "id", clean_stats());

    let result = h.run().await.unwrap();

    assert_eq!(result.candidates_evaluated, 1);
    assert_eq!(result.relationships_created, 1);
    assert_eq!(result.relationships_rejected, 0);

    let persisted = h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].key.to_string(), "orders.user_id -> users.id");
    assert_eq!(persisted[0].cardinality, Cardinality::ManyToOne);
    assert_eq!(persisted[0].provenance, Provenance::OracleInference);
    assert_eq!(persisted[0].confidence, 0.95);
}

#[tokio::test]
async fn test_scenario_b_unrelated_keys_are_rejected() {
    let mut log_id = ColumnProfile::new("logs", "id", "bigint");
    log_id.purpose = Some(ColumnPurpose::Identifier);
    log_id.is_unique = true;
    let schema = SchemaSnapshot {
        columns: vec![
            log_id,
            pk_column("events", "id", "bigint"),
            attribute_column("events", "occurred_at", "timestamp"),
            attribute_column("logs", "logged_at", "timestamp"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "logs.id -> events.id",
            verdict_json(false, 0.9, "1:1", "both are surrogate keys of unrelated tables"),
        )]),
    );
    h.executor
        .with_pair_stats("logs", "id", "events", "id", clean_stats());

    let result = h.run().await.unwrap();
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);

    assert!(h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
    let rejections = h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].key.to_string(), "logs.id -> events.id");
    assert_eq!(rejections[0].provenance, Provenance::OracleInference);
    assert_eq!(
        rejections[0].reason,
        "both are surrogate keys of unrelated tables"
    );
}

#[tokio::test]
async fn test_scenario_c_orphan_count_reaches_oracle() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("accounts", "id", "bigint"),
            fk_column("transactions", "account_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "transactions.account_id -> accounts.id",
            verdict_json(false, 0.85, "N:1", "half of the account ids have no account"),
        )]),
    );
    h.executor.with_pair_stats(
        "transactions",
        "account_id",
        "accounts",
        "id",
        PairStats {
            matched_rows: 900,
            matched_source_distinct: 50,
            matched_target_distinct: 50,
            orphans: 50,
            reverse_orphans: 0,
        },
    );

    let result = h.run().await.unwrap();
    assert_eq!(result.relationships_created, 0);
    assert!(h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());

    let requests = h.oracle.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].join_statistics.orphan_count, Some(50));
    assert_eq!(requests[0].join_statistics.matched_source_distinct, Some(50));
    let message = render_user_message(&requests[0]).unwrap();
    assert!(message.contains("\"orphan_count\": 50"));
}

#[tokio::test]
async fn test_scenario_d_declared_constraint_skips_oracle() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("orders", "id", "bigint"),
            fk_column("payments", "order_id", "bigint"),
        ],
        foreign_keys: vec![DeclaredForeignKey::single(
            "fk_payments_order",
            "payments",
            "order_id",
            "orders",
            "id",
        )],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));

    let result = h.run().await.unwrap();

    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(result.relationships_created, 1);
    assert_eq!(result.candidates_evaluated, 1);

    let persisted = h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].key.to_string(), "payments.order_id -> orders.id");
    assert_eq!(persisted[0].provenance, Provenance::DbConstraint);
    assert_eq!(persisted[0].cardinality, Cardinality::ManyToOne);
    assert_eq!(persisted[0].confidence, 1.0);
}

#[tokio::test]
async fn test_composite_constraint_is_ignored() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("orders", "id", "bigint"),
            attribute_column("order_lines", "order_id", "bigint"),
            attribute_column("order_lines", "line_no", "integer"),
        ],
        foreign_keys: vec![DeclaredForeignKey {
            name: "fk_composite".to_string(),
            source_table: "shipments".to_string(),
            source_columns: vec!["order_id".to_string(), "line_no".to_string()],
            target_table: "order_lines".to_string(),
            target_columns: vec!["order_id".to_string(), "line_no".to_string()],
        }],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));

    let result = h.run().await.unwrap();
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.candidates_evaluated, 0);
}

#[tokio::test]
async fn test_low_confidence_acceptance_is_dropped_silently() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("tickets", "assignee", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "tickets.assignee -> users.id",
            verdict_json(true, 0.55, "N:1", "plausible but thin evidence"),
        )]),
    );
    h.executor
        .with_pair_stats("tickets", "assignee", "users", "id", clean_stats());

    let result = h.run().await.unwrap();
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);

    assert!(h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
    let rejections = h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert!(rejections[0].reason.contains("below acceptance bar"));
    assert_eq!(rejections[0].confidence, Some(0.55));
}

#[tokio::test]
async fn test_prior_inference_accepted_on_clean_statistics() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("customers", "id", "bigint"),
            with_prior(
                fk_column("orders", "customer_ref", "bigint"),
                "customers",
                "id",
                0.92,
            ),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));
    h.executor
        .with_pair_stats("orders", "customer_ref", "customers", "id", clean_stats());

    let result = h.run().await.unwrap();

    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(result.relationships_created, 1);
    let persisted = h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(persisted[0].provenance, Provenance::ColumnFeatures);
    assert_eq!(persisted[0].cardinality, Cardinality::ManyToOne);
}

#[tokio::test]
async fn test_prior_inference_rejected_on_orphans_is_not_reopened() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("customers", "id", "bigint"),
            with_prior(
                fk_column("orders", "customer_ref", "bigint"),
                "customers",
                "id",
                0.92,
            ),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));
    h.executor.with_pair_stats(
        "orders",
        "customer_ref",
        "customers",
        "id",
        PairStats {
            matched_rows: 70,
            matched_source_distinct: 70,
            matched_target_distinct: 70,
            orphans: 30,
            reverse_orphans: 0,
        },
    );

    let result = h.run().await.unwrap();

    // Settled by the prior tier; the oracle never sees the column.
    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);
    let rejections = h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(rejections[0].provenance, Provenance::ColumnFeatures);
    assert!(rejections[0].reason.contains("orphan ratio"));
}

#[tokio::test]
async fn test_prior_inference_to_non_unique_target_is_rejected() {
    let schema = SchemaSnapshot {
        columns: vec![
            attribute_column("customers", "email", "text"),
            with_prior(
                fk_column("orders", "contact", "text"),
                "customers",
                "email",
                0.99,
            ),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));

    let result = h.run().await.unwrap();
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);
    // No statistics are gathered for a structurally invalid target.
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn test_weak_prior_goes_through_oracle() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("customers", "id", "bigint"),
            with_prior(
                fk_column("orders", "customer_ref", "bigint"),
                "customers",
                "id",
                0.4,
            ),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "orders.customer_ref -> customers.id",
            verdict_json(true, 0.9, "N:1", "customer reference"),
        )]),
    );
    h.executor
        .with_pair_stats("orders", "customer_ref", "customers", "id", clean_stats());

    let result = h.run().await.unwrap();
    assert_eq!(h.oracle.calls(), 1);
    assert_eq!(result.relationships_created, 1);
}

#[tokio::test]
async fn test_failed_validations_are_unresolved_not_rejected() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
            fk_column("orders", "approver_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::new(|request| {
            if request.source.column == "approver_id" {
                Err(OracleError::Transport("timed out".to_string()))
            } else {
                Ok(verdict_json(true, 0.9, "N:1", "owner"))
            }
        }),
    );

    let result = h.run().await.unwrap();
    assert_eq!(result.candidates_evaluated, 2);
    assert_eq!(result.relationships_created, 1);
    assert_eq!(result.relationships_rejected, 0);
    assert_eq!(result.candidates_unresolved, 1);
    assert!(h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_all_validations_failing_is_fatal() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::new(|_| Err(OracleError::EmptyResponse)),
    );

    let result = h.run().await;
    assert!(matches!(
        result,
        Err(DiscoveryError::Validation(ValidatorError::AllFailed { count: 1, .. }))
    ));
}

#[tokio::test]
async fn test_missing_metadata_is_fatal() {
    let h = Harness::new(SchemaSnapshot::default(), RecordingOracle::scripted(&[]));
    let result = h.run().await;
    assert!(matches!(result, Err(DiscoveryError::Metadata(_))));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (project, datasource) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .save_schema(
            project,
            datasource,
            &SchemaSnapshot {
                columns: vec![pk_column("users", "id", "bigint")],
                foreign_keys: vec![],
            },
        )
        .unwrap();
    let oracle = Arc::new(RecordingOracle::scripted(&[]));

    let orchestrator = DiscoveryOrchestrator::new(
        store.clone(),
        Arc::new(RefusingConnector),
        oracle.clone(),
        store,
        DiscoverySettings::default(),
    );
    let result = orchestrator
        .discover_relationships(&CancellationToken::new(), project, datasource, None)
        .await;

    assert!(matches!(result, Err(DiscoveryError::Connect(_))));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![DeclaredForeignKey::single(
            "fk_orders_user",
            "orders",
            "user_id",
            "users",
            "id",
        )],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));

    h.run().await.unwrap();
    h.run().await.unwrap();

    let persisted = h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn test_rerun_withdraws_relationship_the_oracle_now_rejects() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(
        schema,
        RecordingOracle::scripted(&[(
            "orders.user_id -> users.id",
            verdict_json(true, 0.95, "N:1", "owner"),
        )]),
    );
    h.executor
        .with_pair_stats("orders", "user_id", "users", "id", clean_stats());
    h.run().await.unwrap();

    let rejecting = DiscoveryOrchestrator::new(
        h.store.clone(),
        h.connector.clone(),
        Arc::new(RecordingOracle::scripted(&[])),
        h.store.clone(),
        DiscoverySettings::default(),
    );
    let result = rejecting
        .discover_relationships(&CancellationToken::new(), h.project_id, h.datasource_id, None)
        .await
        .unwrap();
    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);

    assert!(h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.store
            .list_rejections(h.project_id, h.datasource_id)
            .await
            .unwrap()
            .len(),
        1
    );

    // Accepting again clears the audit entry.
    h.run().await.unwrap();
    assert_eq!(
        h.store
            .list_relationships(h.project_id, h.datasource_id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_prior_inference_pointing_at_itself_is_rejected() {
    let schema = SchemaSnapshot {
        columns: vec![with_prior(pk_column("users", "id", "bigint"), "users", "id", 0.99)],
        foreign_keys: vec![],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));
    h.executor.with_pair_stats("users", "id", "users", "id", clean_stats());

    let result = h.run().await.unwrap();

    assert_eq!(result.relationships_created, 0);
    assert_eq!(result.relationships_rejected, 1);
    assert!(h
        .store
        .list_relationships(h.project_id, h.datasource_id)
        .await
        .unwrap()
        .is_empty());
    let rejections = h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(rejections[0].reason, "inferred target is the source column itself");
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn test_prior_inference_with_incompatible_types_is_rejected_without_queries() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("customers", "id", "bigint"),
            with_prior(
                fk_column("orders", "customer_code", "text"),
                "customers",
                "id",
                0.95,
            ),
        ],
        foreign_keys: vec![],
    };
    let h = Harness::new(schema, RecordingOracle::scripted(&[]));

    let result = h.run().await.unwrap();

    assert_eq!(result.relationships_rejected, 1);
    assert_eq!(h.oracle.calls(), 0);
    assert!(h.executor.executed().is_empty());
    let rejections = h
        .store
        .list_rejections(h.project_id, h.datasource_id)
        .await
        .unwrap();
    assert_eq!(rejections[0].provenance, Provenance::ColumnFeatures);
    assert!(rejections[0].reason.contains("not compatible"));
}

#[tokio::test]
async fn test_cancelled_run() {
    let h = Harness::new(
        SchemaSnapshot {
            columns: vec![pk_column("users", "id", "bigint")],
            foreign_keys: vec![],
        },
        RecordingOracle::scripted(&[]),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h
        .orchestrator(DiscoverySettings::default())
        .discover_relationships(&cancel, h.project_id, h.datasource_id, None)
        .await;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
}
