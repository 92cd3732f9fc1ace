use super::*;
use crate::artifact::MemoryArtifactStore;
use crate::store::{MemoryDataStore, MockDataStore};
use crate::Document;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("test document must be an object"),
    }
}

fn create_test_engine(
    store: &MemoryDataStore,
) -> (SnapshotEngine<MemoryDataStore, MemoryArtifactStore>, MemoryArtifactStore) {
    let artifacts = MemoryArtifactStore::new();
    (
        SnapshotEngine::new(store.clone(), artifacts.clone()),
        artifacts,
    )
}

fn read_body(artifacts: &MemoryArtifactStore, name: &str) -> Value {
    serde_json::from_slice(&artifacts.read(name).unwrap()).unwrap()
}

#[tokio::test]
async fn test_export_contains_every_collection_verbatim() {
    let store = MemoryDataStore::with_collections(["users", "orders", "audit"]);
    store.seed("users", vec![doc(json!({"_id": "u1", "name": "A", "roles": ["admin"]}))]);
    store.seed(
        "orders",
        vec![
            doc(json!({"_id": "o1", "total": 12.5})),
            doc(json!({"_id": "o2", "total": 3, "note": null})),
        ],
    );
    let (engine, artifacts) = create_test_engine(&store);

    let receipt = engine.export_snapshot().await.unwrap();

    assert!(receipt.file_name.starts_with("backup-"));
    assert!(receipt.file_name.ends_with(".json"));
    assert!(!receipt.file_name.contains(':'));
    assert_eq!(receipt.collections, 3);
    assert_eq!(receipt.documents, 3);
    assert_eq!(receipt.location, format!("memory://{}", receipt.file_name));
    assert_eq!(receipt.sha256.len(), 64);

    let body = read_body(&artifacts, &receipt.file_name);
    assert_eq!(
        body,
        json!({
            "users": [{"_id": "u1", "name": "A", "roles": ["admin"]}],
            "orders": [{"_id": "o1", "total": 12.5}, {"_id": "o2", "total": 3, "note": null}],
            "audit": []
        })
    );
    let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["users", "orders", "audit"]);
}

#[tokio::test]
async fn test_export_disconnected_store_writes_nothing() {
    let store = MemoryDataStore::with_collections(["users"]);
    store.disconnect();
    let (engine, artifacts) = create_test_engine(&store);

    let err = engine.export_snapshot().await.unwrap_err();

    assert!(matches!(err, SnapvaultError::Connection(_)));
    assert!(artifacts.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_export_write_failure_is_io_error() {
    let store = MemoryDataStore::with_collections(["users"]);
    let (engine, artifacts) = create_test_engine(&store);
    artifacts.set_read_only(true);

    let err = engine.export_snapshot().await.unwrap_err();
    assert!(matches!(err, SnapvaultError::Io(_)));
}

#[tokio::test]
async fn test_consecutive_exports_get_distinct_names() {
    let store = MemoryDataStore::with_collections(["users"]);
    let (engine, artifacts) = create_test_engine(&store);

    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(engine.export_snapshot().await.unwrap().file_name);
    }

    let mut sorted = names.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, names, "names must be unique and increasing");
    assert_eq!(artifacts.list().unwrap().len(), 5);
}

#[tokio::test]
async fn test_restore_replaces_only_named_collections() {
    let store = MemoryDataStore::with_collections(["users", "orders"]);
    store.seed("users", vec![doc(json!({"_id": "old"}))]);
    store.seed("orders", vec![doc(json!({"_id": "o1"}))]);
    let (engine, _) = create_test_engine(&store);

    let report = engine
        .restore_from_value(json!({"users": [{"_id": "u1", "name": "A"}]}))
        .await
        .unwrap();

    assert_eq!(store.documents("users"), vec![doc(json!({"_id": "u1", "name": "A"}))]);
    assert_eq!(store.documents("orders"), vec![doc(json!({"_id": "o1"}))]);
    assert_eq!(
        report.collections,
        vec![CollectionRestore {
            collection: "users".to_string(),
            deleted: 1,
            inserted: 1,
        }]
    );
}

#[tokio::test]
async fn test_restore_then_export_roundtrip() {
    let store = MemoryDataStore::new();
    let (engine, artifacts) = create_test_engine(&store);
    let payload = json!({
        "patients": [{"_id": "p1", "name": "Ada"}, {"_id": "p2", "name": "Grace"}],
        "tokens": [{"_id": "t1", "number": 7}],
        "labs": []
    });

    let report = engine.restore_from_value(payload.clone()).await.unwrap();
    assert_eq!(report.documents_inserted(), 3);

    let receipt = engine.export_snapshot().await.unwrap();
    assert_eq!(read_body(&artifacts, &receipt.file_name), payload);
}

#[tokio::test]
async fn test_restore_rejects_non_object_payload_before_mutation() {
    let store = MemoryDataStore::with_collections(["users"]);
    store.seed("users", vec![doc(json!({"_id": "keep"}))]);
    let (engine, _) = create_test_engine(&store);

    for payload in [json!([{"users": []}]), json!("users"), json!({"users": 5})] {
        let err = engine.restore_from_value(payload).await.unwrap_err();
        assert!(err.is_validation());
    }
    let err = engine.restore_from_bytes(b"not json").await.unwrap_err();
    assert!(err.is_validation());

    assert_eq!(store.documents("users"), vec![doc(json!({"_id": "keep"}))]);
}

#[tokio::test]
async fn test_restore_defines_collections_given_as_empty() {
    let store = MemoryDataStore::with_collections(["users"]);
    let (engine, artifacts) = create_test_engine(&store);

    engine
        .restore_from_value(json!({"labs": [], "users": [{"_id": "u1"}]}))
        .await
        .unwrap();

    assert_eq!(store.collection_names(), vec!["users", "labs"]);
    let receipt = engine.export_snapshot().await.unwrap();
    assert_eq!(
        read_body(&artifacts, &receipt.file_name),
        json!({"users": [{"_id": "u1"}], "labs": []})
    );
}

#[tokio::test]
async fn test_restore_with_invalid_collection_name_mutates_nothing() {
    let store = MemoryDataStore::with_collections(["users"]);
    store.seed("users", vec![doc(json!({"_id": "keep"}))]);
    let (engine, _) = create_test_engine(&store);

    let err = engine
        .restore_from_value(json!({"users": [{"_id": "new"}], ".hidden": []}))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(store.documents("users"), vec![doc(json!({"_id": "keep"}))]);
}

#[tokio::test]
async fn test_restore_body_with_invalid_name_never_touches_store() {
    let mut store = MockDataStore::new();
    store.expect_is_connected().return_const(true);
    store.expect_ensure_collection().never();
    store.expect_delete_all().never();
    store.expect_insert_many().never();
    let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

    let mut body = SnapshotBody::new();
    body.insert("users", vec![doc(json!({"_id": "u1"}))]);
    body.insert("../escape", Vec::new());

    let err = engine.restore_snapshot(body).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_restore_disconnected_store_mutates_nothing() {
    let mut store = MockDataStore::new();
    store.expect_is_connected().return_const(false);
    store.expect_ensure_collection().never();
    store.expect_delete_all().never();
    store.expect_insert_many().never();
    let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

    let err = engine
        .restore_from_value(json!({"users": [{"_id": "u1"}]}))
        .await
        .unwrap_err();
    assert!(matches!(err, SnapvaultError::Connection(_)));
}

#[tokio::test]
async fn test_restore_failure_leaves_later_collections_untouched() {
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut store = MockDataStore::new();
    store.expect_is_connected().return_const(true);
    store.expect_ensure_collection().returning(|_| Ok(()));
    let deletes = Arc::clone(&calls);
    store.expect_delete_all().returning(move |collection| {
        deletes.lock().unwrap().push(format!("delete:{}", collection.to_string()));
        Ok(1)
    });
    let inserts = Arc::clone(&calls);
    store
        .expect_insert_many()
        .returning(move |collection, documents| {
            let name = collection.to_string();
            inserts.lock().unwrap().push(format!("insert:{name}"));
            if name == "orders" {
                Err(SnapvaultError::store("insert rejected"))
            } else {
                Ok(documents.len() as u64)
            }
        });
    let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

    let err = engine
        .restore_from_value(json!({
            "users": [{"_id": "u1"}],
            "orders": [{"_id": "o1"}],
            "audit": [{"_id": "a1"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, SnapvaultError::Store(_)));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["delete:users", "insert:users", "delete:orders", "insert:orders"]
    );
}

#[tokio::test]
async fn test_restore_skips_insert_for_empty_collections() {
    let mut store = MockDataStore::new();
    store.expect_is_connected().return_const(true);
    store.expect_ensure_collection().times(1).returning(|_| Ok(()));
    store.expect_delete_all().times(1).returning(|_| Ok(4));
    store.expect_insert_many().never();
    let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

    let report = engine.restore_from_value(json!({"labs": []})).await.unwrap();
    assert_eq!(report.documents_deleted(), 4);
    assert_eq!(report.documents_inserted(), 0);
}

#[tokio::test]
async fn test_purge_then_export_yields_empty_collections() {
    let store = MemoryDataStore::with_collections(["users", "orders"]);
    store.seed("users", vec![doc(json!({"_id": "u1"})), doc(json!({"_id": "u2"}))]);
    store.seed("orders", vec![doc(json!({"_id": "o1"}))]);
    let (engine, artifacts) = create_test_engine(&store);

    let report = engine.purge_all().await.unwrap();
    assert_eq!(report, PurgeReport { collections: 2, deleted: 3 });
    assert_eq!(store.collection_names(), vec!["users", "orders"]);

    let receipt = engine.export_snapshot().await.unwrap();
    assert_eq!(
        read_body(&artifacts, &receipt.file_name),
        json!({"users": [], "orders": []})
    );
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let store = MemoryDataStore::with_collections(["users"]);
    store.seed("users", vec![doc(json!({"_id": "u1"}))]);
    let (engine, _) = create_test_engine(&store);

    engine.purge_all().await.unwrap();
    let after_first = engine.collect_snapshot().await.unwrap();
    let second = engine.purge_all().await.unwrap();
    let after_second = engine.collect_snapshot().await.unwrap();

    assert_eq!(second.deleted, 0);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_purge_disconnected_store_deletes_nothing() {
    let mut store = MockDataStore::new();
    store.expect_is_connected().return_const(false);
    store.expect_list_collections().never();
    store.expect_delete_all().never();
    let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

    let err = engine.purge_all().await.unwrap_err();
    assert!(matches!(err, SnapvaultError::Connection(_)));
}

#[tokio::test]
async fn test_empty_store_scenario() {
    let store = MemoryDataStore::with_collections(["users", "orders"]);
    let (engine, artifacts) = create_test_engine(&store);
    let before = Utc::now();

    let receipt = engine.export_snapshot().await.unwrap();
    assert_eq!(
        read_body(&artifacts, &receipt.file_name),
        json!({"users": [], "orders": []})
    );

    engine.restore_artifact(&receipt.file_name).await.unwrap();
    assert!(store.documents("users").is_empty());
    assert!(store.documents("orders").is_empty());

    assert_eq!(engine.purge_all().await.unwrap().deleted, 0);

    let listed = engine.list_artifacts().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, receipt.file_name);
    assert!(listed[0].last_modified >= before - Duration::seconds(1));
}

#[tokio::test]
async fn test_restore_unknown_artifact_is_not_found() {
    let store = MemoryDataStore::new();
    let (engine, _) = create_test_engine(&store);

    let err = engine
        .restore_artifact("backup-1999-01-01T00-00-00-000Z.json")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(engine.read_artifact("nope.json").unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_engine_from_config_and_exporter_trait() {
    let store = MemoryDataStore::with_collections(["users"]);
    let engine = create_engine_from_config(store, &ArtifactConfig::memory()).unwrap();

    let exporter: Arc<dyn SnapshotExporter> = Arc::new(engine);
    let receipt = exporter.export_snapshot().await.unwrap();
    assert_eq!(receipt.collections, 1);
}
