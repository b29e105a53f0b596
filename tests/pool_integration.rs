use qanun_db::{PoolBuilder, PoolError, QueryOptions, QueryOutcome, SqlParam};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::time::sleep;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const DOCS_DDL: &str = "CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        category TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_documents_category ON documents (category);";

async fn docs_pool(dir: &TempDir) -> Arc<qanun_db::ConnectionPool> {
    PoolBuilder::new(dir.path().join("legal.db"))
        .min_connections(2)
        .max_connections(3)
        .bootstrap_sql(DOCS_DDL)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn mutations_and_selects_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let pool = docs_pool(&dir).await;

    let outcome = pool
        .execute(
            "INSERT INTO documents (title, category) VALUES (?, ?)",
            vec![SqlParam::from("رأی وحدت رویه"), SqlParam::from("ruling")],
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(
        outcome,
        QueryOutcome::Mutation {
            rows_affected: 1,
            last_insert_rowid: 1,
        }
    );

    let rows = pool
        .execute(
            "SELECT title, category FROM documents WHERE category = ?",
            vec![SqlParam::from("ruling")],
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(rows.rows().len(), 1);
    assert_eq!(rows.rows()[0]["title"], serde_json::json!("رأی وحدت رویه"));

    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn bootstrap_ddl_creates_secondary_indexes() {
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;

    let rows = pool
        .execute(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?",
            vec![SqlParam::from("idx_documents_category")],
            QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(rows.rows().len(), 1);

    pool.close().await;
}

#[tokio::test]
async fn cached_query_counts_hits_and_expires() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;
    let options = QueryOptions::cached(Duration::from_millis(300));

    let first = pool.execute("SELECT 1 AS n", vec![], options).await.unwrap();
    let second = pool.execute("SELECT 1 AS n", vec![], options).await.unwrap();
    assert_eq!(first, second);

    let stats = pool.stats().await;
    assert_eq!(stats.performance.cache_hits, 1);
    assert_eq!(stats.performance.cache_misses, 1);

    sleep(Duration::from_millis(400)).await;
    pool.execute("SELECT 1 AS n", vec![], options).await.unwrap();

    let stats = pool.stats().await;
    assert_eq!(stats.performance.cache_hits, 1);
    assert_eq!(stats.performance.cache_misses, 2);

    pool.close().await;
}

#[tokio::test]
async fn cache_hit_does_not_reach_the_engine() {
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;
    let options = QueryOptions::cached(Duration::from_millis(250));

    pool.execute(
        "INSERT INTO documents (title) VALUES (?)",
        vec![SqlParam::from("سند اول")],
        QueryOptions::default(),
    )
    .await
    .unwrap();

    let count_sql = "SELECT COUNT(*) AS c FROM documents";
    let before = pool.execute(count_sql, vec![], options).await.unwrap();
    assert_eq!(before.rows()[0]["c"], serde_json::json!(1));

    pool.execute(
        "INSERT INTO documents (title) VALUES (?)",
        vec![SqlParam::from("سند دوم")],
        QueryOptions::default(),
    )
    .await
    .unwrap();

    // Within the TTL the cached count is served, stale by design.
    let cached = pool.execute(count_sql, vec![], options).await.unwrap();
    assert_eq!(cached.rows()[0]["c"], serde_json::json!(1));

    sleep(Duration::from_millis(300)).await;
    let fresh = pool.execute(count_sql, vec![], options).await.unwrap();
    assert_eq!(fresh.rows()[0]["c"], serde_json::json!(2));

    pool.close().await;
}

#[tokio::test]
async fn slow_queries_are_ringed_fast_ones_are_not() {
    let dir = TempDir::new().unwrap();

    let strict = PoolBuilder::new(dir.path().join("strict.db"))
        .min_connections(1)
        .max_connections(2)
        .slow_query_threshold(Duration::from_millis(0))
        .build()
        .await
        .unwrap();
    strict
        .execute("SELECT 1", vec![], QueryOptions::default())
        .await
        .unwrap();
    let stats = strict.stats().await;
    assert_eq!(stats.performance.slow_queries.len(), 1);
    assert_eq!(stats.performance.slow_queries[0].sql, "SELECT 1");
    strict.close().await;

    let lenient = PoolBuilder::new(dir.path().join("lenient.db"))
        .min_connections(1)
        .max_connections(2)
        .build()
        .await
        .unwrap();
    lenient
        .execute("SELECT 1", vec![], QueryOptions::default())
        .await
        .unwrap();
    let stats = lenient.stats().await;
    assert!(stats.performance.slow_queries.is_empty());
    assert_eq!(stats.performance.total_queries, 1);
    lenient.close().await;
}

#[tokio::test]
async fn fourth_borrower_times_out_or_inherits_a_release() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = PoolBuilder::new(dir.path().join("legal.db"))
        .min_connections(2)
        .max_connections(3)
        .connection_timeout(Duration::from_millis(50))
        .build()
        .await
        .unwrap();

    let b1 = pool.acquire().await.unwrap();
    let b2 = pool.acquire().await.unwrap();
    let b3 = pool.acquire().await.unwrap();

    // Nothing released: B4 fails with Exhausted after roughly the timeout.
    let started = Instant::now();
    match pool.acquire().await {
        Err(PoolError::Exhausted { .. }) => {}
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(50));

    // B1 releases at ~20ms: B4 succeeds and receives B1's freed connection.
    let b1_id = b1.id();
    let releaser = tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        drop(b1);
    });
    let b4 = pool.acquire().await.unwrap();
    assert_eq!(b4.id(), b1_id);
    releaser.await.unwrap();

    drop(b2);
    drop(b3);
    drop(b4);
    sleep(Duration::from_millis(20)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.connections.total, 3);
    assert_eq!(stats.connections.busy, 0);

    pool.close().await;
}

#[tokio::test]
async fn concurrent_writers_stay_within_capacity() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.execute(
                    "INSERT INTO documents (title) VALUES (?)",
                    vec![SqlParam::from(format!("پرونده {i}"))],
                    QueryOptions::default(),
                )
                .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let count = pool
        .execute(
            "SELECT COUNT(*) AS c FROM documents",
            vec![],
            QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(count.rows()[0]["c"], serde_json::json!(20));

    sleep(Duration::from_millis(20)).await;
    let stats = pool.stats().await;
    assert!(stats.connections.total <= 3);
    assert_eq!(stats.performance.total_queries, 21);
    assert_eq!(
        stats.connections.total,
        stats.connections.available + stats.connections.busy
    );

    pool.close().await;
}

#[tokio::test]
async fn idle_connections_are_reclaimed_down_to_minimum() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = PoolBuilder::new(dir.path().join("legal.db"))
        .min_connections(1)
        .max_connections(3)
        .idle_timeout(Duration::from_millis(100))
        .maintenance_interval(Duration::from_millis(50))
        .build()
        .await
        .unwrap();

    // Force the pool to grow to three live connections.
    let g1 = pool.acquire().await.unwrap();
    let g2 = pool.acquire().await.unwrap();
    let g3 = pool.acquire().await.unwrap();
    drop(g1);
    drop(g2);
    drop(g3);

    sleep(Duration::from_millis(400)).await;

    let stats = pool.stats().await;
    assert_eq!(stats.connections.total, 1);
    assert_eq!(stats.connections.available, 1);
    assert!(stats.connections.destroyed >= 2);

    pool.close().await;
}

#[tokio::test]
async fn statement_errors_propagate_and_retire_the_connection() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;

    let err = pool
        .execute("SELECT * FROM no_such_table", vec![], QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Statement { .. }));

    let err = pool
        .execute(
            "INSERT INTO documents (category) VALUES (?)", // NOT NULL title
            vec![SqlParam::from("contract")],
            QueryOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Statement { .. }));

    // The pool keeps serving on healthy connections.
    pool.execute("SELECT 1", vec![], QueryOptions::default())
        .await
        .unwrap();

    sleep(Duration::from_millis(20)).await;
    let stats = pool.stats().await;
    assert!(stats.connections.destroyed >= 2);
    assert_eq!(
        stats.connections.total,
        stats.connections.available + stats.connections.busy
    );

    pool.close().await;
}

#[tokio::test]
async fn restoration_and_growth_never_exceed_capacity() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let pool = PoolBuilder::new(dir.path().join("legal.db"))
        .min_connections(1)
        .max_connections(1)
        .maintenance_interval(Duration::from_millis(1))
        .build()
        .await
        .unwrap();

    // Each failed statement retires its connection, so the maintenance
    // restore and the next borrow's on-demand open keep racing for the one
    // capacity slot.
    for _ in 0..25 {
        let err = pool
            .execute("SELECT * FROM missing_table", vec![], QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Statement { .. }));

        pool.execute("SELECT 1", vec![], QueryOptions::default())
            .await
            .unwrap();

        let stats = pool.stats().await;
        assert!(
            stats.connections.total <= 1,
            "live connections exceeded capacity: total={}",
            stats.connections.total
        );
        assert_eq!(
            stats.connections.total,
            stats.connections.available + stats.connections.busy
        );
    }

    pool.close().await;
}

#[tokio::test]
async fn on_demand_growth_failure_fails_only_that_borrow() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    // A directory at the database path makes every open fail.
    let db_path = dir.path().join("not_a_file");
    std::fs::create_dir(&db_path).unwrap();

    let pool = PoolBuilder::new(&db_path)
        .min_connections(0)
        .max_connections(2)
        .build()
        .await
        .unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::CreateConnection { .. }));

    // The pool itself survives the failed growth attempt.
    let stats = pool.stats().await;
    assert_eq!(stats.connections.total, 0);
    assert!(matches!(
        pool.acquire().await,
        Err(PoolError::CreateConnection { .. })
    ));

    pool.close().await;
}

#[tokio::test]
async fn execute_after_close_fails_immediately() {
    let dir = TempDir::new().unwrap();
    let pool = docs_pool(&dir).await;

    pool.close().await;

    let started = Instant::now();
    let err = pool
        .execute("SELECT 1", vec![], QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Closed));
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn stats_snapshot_is_serializable_for_the_dashboard() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = docs_pool(&dir).await;

    pool.execute(
        "SELECT 1 AS n",
        vec![],
        QueryOptions::cached(Duration::from_secs(10)),
    )
    .await?;

    let stats = pool.stats().await;
    assert_eq!(stats.cached_results, 1);

    let json = serde_json::to_value(&stats)?;
    assert!(json["connections"]["total"].is_u64());
    assert!(json["performance"]["average_query_time_ms"].is_f64());
    assert!(json["performance"]["cache_hit_rate"].is_f64());

    pool.close().await;
    Ok(())
}
