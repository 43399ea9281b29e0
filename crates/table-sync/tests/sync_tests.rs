//! End-to-end sync behaviour against the in-memory store.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use table_sync::core::Statement;
use table_sync::{
    Column, HashLocation, MemoryDatabase, Row, RowKey, SqlValue, SyncConfig, TableConnection,
    TableSchema,
};

type Contents = BTreeMap<i64, Option<String>>;

fn schema(name: &str) -> TableSchema {
    TableSchema::new(
        name,
        vec![Column::new("id", "bigint").not_null(), Column::new("name", "varchar")],
        vec!["id".into()],
    )
    .unwrap()
}

fn row(id: i64, name: Option<&str>) -> Row {
    Row::from_pairs([("id", SqlValue::Int(id)), ("name", name.into())])
}

fn rows_of(contents: &Contents) -> Vec<Row> {
    contents.iter().map(|(id, name)| row(*id, name.as_deref())).collect()
}

async fn open(db: &MemoryDatabase, name: &str, config: SyncConfig, contents: &Contents) -> TableConnection {
    db.create_table(schema(name)).await;
    db.seed(name, rows_of(contents)).await.unwrap();
    TableConnection::open(db, name, config).await.unwrap()
}

fn contents(pairs: &[(i64, &str)]) -> Contents {
    pairs.iter().map(|(id, name)| (*id, Some(name.to_string()))).collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_replaces_obsolete_and_adds_new() {
    let db = MemoryDatabase::new();
    let table = open(&db, "t", SyncConfig::default(), &contents(&[(1, "a"), (2, "b")])).await;

    let report = table
        .sync_rows(&rows_of(&contents(&[(2, "b"), (3, "c")])))
        .await
        .unwrap();
    assert_eq!((report.unchanged, report.obsolete, report.stale, report.new), (1, 1, 0, 1));
    assert_eq!(db.rows("t").await.unwrap(), vec![row(2, Some("b")), row(3, Some("c"))]);
}

#[tokio::test]
async fn test_changed_column_is_deleted_and_reinserted() {
    let db = MemoryDatabase::new();
    let table = open(&db, "t", SyncConfig::default(), &contents(&[(1, "a"), (2, "b")])).await;
    db.clear_statements().await;

    let report = table
        .sync_rows(&rows_of(&contents(&[(1, "a"), (2, "B")])))
        .await
        .unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(report.rows_deleted, 1);
    assert_eq!(report.rows_inserted, 1);

    let kinds: Vec<&str> = db
        .statements()
        .await
        .iter()
        .filter(|s| s.is_write())
        .map(Statement::kind)
        .collect();
    assert_eq!(kinds, vec!["delete", "insert"]);
    assert_eq!(db.rows("t").await.unwrap()[1], row(2, Some("B")));
}

#[tokio::test]
async fn test_null_and_null_string_are_different_rows() {
    let db = MemoryDatabase::new();
    let mut live = Contents::new();
    live.insert(1, None);
    let table = open(&db, "t", SyncConfig::default(), &live).await;

    let report = table.sync_rows(&[row(1, Some("NULL"))]).await.unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(db.rows("t").await.unwrap(), vec![row(1, Some("NULL"))]);
}

#[tokio::test]
async fn test_second_sync_writes_nothing() {
    let db = MemoryDatabase::new();
    let table = open(&db, "t", SyncConfig::default(), &contents(&[(1, "a"), (5, "e")])).await;
    let desired = rows_of(&contents(&[(1, "z"), (2, "b"), (3, "c")]));

    table.sync_rows(&desired).await.unwrap();
    db.clear_statements().await;

    let again = table.sync_rows(&desired).await.unwrap();
    assert!(again.was_in_sync());
    assert!(db.statements().await.iter().all(|s| !s.is_write()));
}

#[tokio::test]
async fn test_interrupted_sync_converges_on_rerun() {
    let db = MemoryDatabase::new();
    let config = SyncConfig::default().with_chunk_size(2);
    let initial: Contents = (1..=6i64).map(|id| (id, Some(format!("old-{}", id)))).collect();
    let table = open(&db, "t", config, &initial).await;
    let desired: Contents = (1..=6i64).map(|id| (id, Some(format!("new-{}", id)))).collect();

    db.clear_statements().await;
    // hash read, three delete chunks, then the first insert chunk fails
    db.fail_on_statement(4).await;
    assert!(table.sync_rows(&rows_of(&desired)).await.is_err());
    assert!(db.rows("t").await.unwrap().is_empty());

    table.sync_rows(&rows_of(&desired)).await.unwrap();
    assert_eq!(db.rows("t").await.unwrap(), rows_of(&desired));
}

#[tokio::test]
async fn test_sync_from_table_across_databases() {
    let source_db = MemoryDatabase::new();
    let target_db = MemoryDatabase::new();
    let config = SyncConfig::default().with_chunk_size(3);
    let desired: Contents = (1..=10i64).map(|id| (id, Some(format!("v{}", id % 4)))).collect();
    let source = open(&source_db, "items", config, &desired).await;
    let target = open(&target_db, "items", config, &contents(&[(2, "v2"), (11, "gone"), (4, "old")])).await;

    let dry = target.dry_run_from_table(&source).await.unwrap();
    assert!(dry.dry_run);
    assert_eq!(target_db.rows("items").await.unwrap().len(), 3);

    let report = target.sync_from_table(&source).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.obsolete, 1);
    assert_eq!(report.stale, 1);
    assert_eq!(report.new, 8);
    assert_eq!(
        target.fetch_table_hash().await.unwrap(),
        source.fetch_table_hash().await.unwrap()
    );
    assert!(target.diff_against(&source).await.unwrap().is_in_sync());
}

#[tokio::test]
async fn test_hash_location_does_not_change_digests() {
    let db = MemoryDatabase::new();
    let data = contents(&[(1, "a#b"), (2, "c\\d"), (3, "")]);
    let server = open(&db, "t", SyncConfig::default(), &data).await;
    let client = TableConnection::open(
        &db,
        "t",
        SyncConfig::default().with_hash_location(HashLocation::Client),
    )
    .await
    .unwrap();

    assert_eq!(
        server.fetch_full_hash_index().await.unwrap(),
        client.fetch_full_hash_index().await.unwrap()
    );
}

#[tokio::test]
async fn test_replace_is_repeatable() {
    let db = MemoryDatabase::new();
    let table = open(&db, "t", SyncConfig::default(), &contents(&[(1, "a"), (2, "b")])).await;
    let keys = vec![RowKey::from(1i64)];
    let rows = vec![row(2, Some("x")), row(3, Some("y"))];

    table.replace(&keys, &rows).await.unwrap();
    let first = db.rows("t").await.unwrap();
    table.replace(&keys, &rows).await.unwrap();
    assert_eq!(db.rows("t").await.unwrap(), first);
    assert_eq!(first, rows);
}

#[tokio::test]
async fn test_empty_input_issues_no_statement() {
    let db = MemoryDatabase::new();
    let table = open(&db, "t", SyncConfig::default(), &Contents::new()).await;
    db.clear_statements().await;

    assert!(table.fetch_by_keys(&[]).await.unwrap().is_empty());
    assert!(table.fetch_row_hashes(&[]).await.unwrap().is_empty());
    assert_eq!(table.delete_by_keys(&[]).await.unwrap(), 0);
    assert_eq!(table.insert_rows(&[]).await.unwrap(), 0);
    assert!(db.statements().await.is_empty());
}

fn contents_strategy() -> impl Strategy<Value = Contents> {
    prop::collection::btree_map(0i64..40, prop::option::of("[a-c#\\\\]{0,3}"), 0..20)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sync_makes_table_equal_desired(live in contents_strategy(), desired in contents_strategy(), chunk in 1usize..6) {
        let (report, after, rerun_writes) = runtime().block_on(async {
            let db = MemoryDatabase::new();
            let table = open(&db, "t", SyncConfig::default().with_chunk_size(chunk), &live).await;
            let report = table.sync_rows(&rows_of(&desired)).await.unwrap();
            let after = db.rows("t").await.unwrap();
            db.clear_statements().await;
            table.sync_rows(&rows_of(&desired)).await.unwrap();
            let rerun_writes = db.statements().await.iter().filter(|s| s.is_write()).count();
            (report, after, rerun_writes)
        });

        prop_assert_eq!(after, rows_of(&desired));
        prop_assert_eq!(rerun_writes, 0);

        let all: BTreeSet<i64> = live.keys().chain(desired.keys()).copied().collect();
        prop_assert_eq!(report.unchanged + report.obsolete + report.stale + report.new, all.len());
        let same = live.iter().filter(|(k, v)| desired.get(*k) == Some(*v)).count();
        prop_assert_eq!(report.unchanged, same);
    }

    #[test]
    fn chunked_operations_use_ceil_chunks(n in 0usize..30, chunk in 1usize..8, server in any::<bool>()) {
        let location = if server { HashLocation::Server } else { HashLocation::Client };
        let config = SyncConfig::default().with_chunk_size(chunk).with_hash_location(location);
        let sizes = runtime().block_on(async {
            let db = MemoryDatabase::new();
            let table = open(&db, "t", config, &Contents::new()).await;
            let data: Contents = (0..n as i64).map(|id| (id, Some(id.to_string()))).collect();
            let keys: Vec<RowKey> = data.keys().map(|id| RowKey::from(*id)).collect();
            let mut sizes = Vec::new();

            db.clear_statements().await;
            assert_eq!(table.insert_rows(&rows_of(&data)).await.unwrap(), n as u64);
            sizes.push(item_counts(&db).await);

            db.clear_statements().await;
            assert_eq!(table.fetch_by_keys(&keys).await.unwrap().len(), n);
            sizes.push(item_counts(&db).await);

            db.clear_statements().await;
            assert_eq!(table.fetch_row_hashes(&keys).await.unwrap().len(), n);
            sizes.push(item_counts(&db).await);

            db.clear_statements().await;
            assert_eq!(table.delete_by_keys(&keys).await.unwrap(), n as u64);
            sizes.push(item_counts(&db).await);
            sizes
        });

        let expected = (n + chunk - 1) / chunk;
        for counts in sizes {
            prop_assert_eq!(counts.len(), expected);
            prop_assert!(counts.iter().all(|&c| c >= 1 && c <= chunk));
            prop_assert_eq!(counts.iter().sum::<usize>(), n);
        }
    }
}

async fn item_counts(db: &MemoryDatabase) -> Vec<usize> {
    db.statements().await.iter().map(Statement::item_count).collect()
}
