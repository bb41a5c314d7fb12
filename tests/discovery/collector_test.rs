#[path = "../common/mod.rs"]
mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use common::*;
use keystone::config::DiscoverySettings;
use keystone::discovery::{
    collector, CandidateCollector, DiscoveryError, ProgressFn, TypeCompatibility,
};
use keystone::metadata::{ColumnMetadataReader, SchemaSnapshot};
use keystone::sql::{sample_query, Dialect, JoinStatsQueries};
use keystone::store::SqliteStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn collector_for(
    executor: Arc<ScriptedExecutor>,
    settings: &DiscoverySettings,
) -> CandidateCollector {
    let reader: Arc<dyn ColumnMetadataReader> = Arc::new(SqliteStore::open_in_memory().unwrap());
    CandidateCollector::new(reader, Arc::new(StaticConnector::new(executor)), settings)
}

fn mixed_schema() -> SchemaSnapshot {
    let mut unique_fk = fk_column("accounts", "external_ref", "varchar(64)");
    unique_fk.is_unique = true;
    let mut busy = attribute_column("events", "session_key", "varchar(64)");
    busy.distinct_count = Some(5_000_000);

    SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            pk_column("accounts", "id", "integer"),
            unique_fk,
            busy,
            fk_column("orders", "user_id", "integer"),
            fk_column("orders", "account_code", "char(64)"),
            fk_column("orders", "coupon_code", "text"),
            fk_column("orders", "is_gift", "boolean"),
            fk_column("orders", "placed_at", "timestamp"),
        ],
        foreign_keys: vec![],
    }
}

#[tokio::test]
async fn test_candidates_are_structurally_valid() {
    let schema = mixed_schema();
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor.clone(), &DiscoverySettings::default());

    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &HashSet::new(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!candidates.is_empty());
    for c in &candidates {
        assert!(
            !c.source.is_same_column(&c.target.table, &c.target.column),
            "self pair {}",
            c.key()
        );
        assert!(c.target.is_unique_key(), "non-unique target {}", c.key());
        assert!(
            TypeCompatibility::compatible(&c.source.data_type, &c.target.data_type),
            "incompatible pair {}",
            c.key()
        );
        assert!(!c.source.is_primary_key);
    }

    let keys: Vec<String> = candidates.iter().map(|c| c.key().to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "orders.user_id -> users.id",
            "orders.user_id -> accounts.id",
            "orders.account_code -> accounts.external_ref",
        ]
    );
}

#[tokio::test]
async fn test_failed_statistics_keep_candidate() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let executor = Arc::new(ScriptedExecutor::new());
    let queries = JoinStatsQueries::build(Dialect::Postgres, "orders", "user_id", "users", "id");
    executor.with_pair_stats(
        "orders",
        "user_id",
        "users",
        "id",
        PairStats {
            matched_rows: 120,
            matched_source_distinct: 40,
            matched_target_distinct: 40,
            orphans: 0,
            reverse_orphans: 5,
        },
    );
    executor.fail(queries.orphans.clone(), "statement timeout");
    executor.with_samples("users", "id", &["1", "2", "3"]);

    let collector = collector_for(executor.clone(), &DiscoverySettings::default());
    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &HashSet::new(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    let stats = &candidates[0].stats;
    assert_eq!(stats.matched_rows, Some(120));
    assert_eq!(stats.matched_source_distinct, Some(40));
    assert_eq!(stats.orphan_count, None);
    assert_eq!(stats.reverse_orphan_count, Some(5));

    // Source samples failed (unscripted), target samples succeeded.
    assert!(candidates[0].source_samples.is_empty());
    assert_eq!(candidates[0].target_samples, vec!["1", "2", "3"]);

    let executed = executor.executed();
    assert!(executed.contains(&queries.orphans));
    assert!(executed.contains(&sample_query(Dialect::Postgres, "orders", "user_id", 10)));
}

#[tokio::test]
async fn test_samples_fetched_once_per_column() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            pk_column("customers", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor.clone(), &DiscoverySettings::default());

    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &HashSet::new(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);

    let source_sample_sql = sample_query(Dialect::Postgres, "orders", "user_id", 10);
    let fetches = executor
        .executed()
        .iter()
        .filter(|sql| **sql == source_sample_sql)
        .count();
    assert_eq!(fetches, 1);
}

#[tokio::test]
async fn test_excluded_sources_are_skipped() {
    let schema = SchemaSnapshot {
        columns: vec![
            pk_column("users", "id", "bigint"),
            fk_column("orders", "user_id", "bigint"),
            fk_column("orders", "reviewer_id", "bigint"),
        ],
        foreign_keys: vec![],
    };
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor.clone(), &DiscoverySettings::default());

    let excluded: HashSet<_> = [collector::column_key("ORDERS", "User_Id")].into();
    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &excluded,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let keys: Vec<String> = candidates.iter().map(|c| c.key().to_string()).collect();
    assert_eq!(keys, vec!["orders.reviewer_id -> users.id"]);
}

#[tokio::test]
async fn test_progress_reported_during_statistics() {
    let mut columns = vec![pk_column("users", "id", "bigint")];
    for i in 0..12 {
        columns.push(fk_column(&format!("t{}", i), "user_id", "bigint"));
    }
    let schema = SchemaSnapshot {
        columns,
        foreign_keys: vec![],
    };

    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |current: usize, total: usize, _message: &str| {
        sink.lock().unwrap().push((current, total));
    });

    let settings = DiscoverySettings {
        stats_concurrency: 4,
        ..Default::default()
    };
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor.clone(), &settings);
    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &HashSet::new(),
            Some(&progress),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(candidates.len(), 12);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(&seen[..3], &[(0, 0), (0, 0), (0, 12)]);
    assert_eq!(&seen[3..], &[(10, 12), (12, 12)]);
}

#[tokio::test]
async fn test_parallel_statistics_preserve_order() {
    let mut columns = vec![pk_column("users", "id", "bigint")];
    for i in 0..8 {
        columns.push(fk_column(&format!("t{}", i), "user_id", "bigint"));
    }
    let schema = SchemaSnapshot {
        columns,
        foreign_keys: vec![],
    };
    let executor = Arc::new(ScriptedExecutor::new());
    for i in 0..8 {
        executor.with_pair_stats(
            &format!("t{}", i),
            "user_id",
            "users",
            "id",
            PairStats {
                matched_rows: i,
                matched_source_distinct: i,
                matched_target_distinct: i,
                orphans: 0,
                reverse_orphans: 0,
            },
        );
    }

    let settings = DiscoverySettings {
        stats_concurrency: 3,
        ..Default::default()
    };
    let collector = collector_for(executor.clone(), &settings);
    let candidates = collector
        .collect_with(
            &schema,
            executor.as_ref(),
            &HashSet::new(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    for (i, c) in candidates.iter().enumerate() {
        assert_eq!(c.source.table, format!("t{}", i));
        assert_eq!(c.stats.matched_rows, Some(i as i64));
    }
}

#[tokio::test]
async fn test_collect_without_metadata_is_fatal() {
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor, &DiscoverySettings::default());

    let result = collector
        .collect(Uuid::new_v4(), Uuid::new_v4(), None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DiscoveryError::Metadata(_))));
}

#[tokio::test]
async fn test_collect_without_connection_is_fatal() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (project, datasource) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .save_schema(project, datasource, &mixed_schema())
        .unwrap();

    let collector = CandidateCollector::new(
        store,
        Arc::new(RefusingConnector),
        &DiscoverySettings::default(),
    );
    let result = collector
        .collect(project, datasource, None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DiscoveryError::Connect(_))));
}

#[tokio::test]
async fn test_collect_loads_schema_and_connects() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (project, datasource) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .save_schema(project, datasource, &mixed_schema())
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let connector = Arc::new(StaticConnector::new(executor));

    let collector = CandidateCollector::new(
        store,
        connector.clone(),
        &DiscoverySettings::default(),
    );
    let candidates = collector
        .collect(project, datasource, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(candidates.len(), 3);
    assert_eq!(connector.connects.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_collection() {
    let executor = Arc::new(ScriptedExecutor::new());
    let collector = collector_for(executor.clone(), &DiscoverySettings::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = collector
        .collect_with(&mixed_schema(), executor.as_ref(), &HashSet::new(), None, &cancel)
        .await;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
}
