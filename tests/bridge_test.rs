//! End-to-end tests for the bridge over the in-memory engine.
//!
//! Every test drives the bridge the way an application layer would: a method
//! name plus a generic request document, checking the generic response.

use bson::{doc, oid::ObjectId};
use mongo_mobile::{
    bridge::Bridge,
    document::{encode_envelope, GenericDocument},
    error::{BridgeError, ErrorKind},
    memory::DUPLICATE_KEY,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

// ============================================================================
// Test Document Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    name: String,
    #[serde(default)]
    age: i32,
}

impl User {
    fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }
}

fn request(value: JsonValue) -> GenericDocument {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("request must be an object: {other}"),
    }
}

fn users(response: &GenericDocument, key: &str) -> Vec<User> {
    serde_json::from_value(response[key].clone()).unwrap()
}

async fn seeded() -> Bridge {
    let bridge = Bridge::in_memory();
    let docs = json!([
        { "name": "Ada", "age": 36 },
        { "name": "Bob", "age": 17 },
        { "name": "Cy", "age": 52 },
        { "name": "Di", "age": 24 },
    ]);
    bridge
        .call(
            "insertMany",
            &request(json!({ "db": "app", "collection": "users", "docs": docs })),
        )
        .await
        .unwrap();
    bridge
}

// ============================================================================
// Read Tests
// ============================================================================

mod read_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_find_with_sort_and_limit() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "options": { "limit": 2, "sort": { "age": -1 } },
                })),
            )
            .await
            .unwrap();

        assert_eq!(response["success"], true);
        assert_eq!(
            users(&response, "results"),
            vec![User::new("Cy", 52), User::new("Ada", 36)]
        );
    }

    #[tokio::test]
    async fn test_find_with_filter_and_projection() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "age": { "$gte": 30 } },
                    "options": { "projection": { "name": 1, "_id": 0 }, "sort": { "name": 1 } },
                })),
            )
            .await
            .unwrap();

        assert_eq!(
            response["results"],
            json!([{ "name": "Ada" }, { "name": "Cy" }])
        );
    }

    #[tokio::test]
    async fn test_lenient_options_are_skipped() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "options": { "limit": "two", "skip": 3 },
                })),
            )
            .await
            .unwrap();

        assert_eq!(response["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_count() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "count",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "age": { "$lt": 30 } },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["count"], 2);
    }

    #[tokio::test]
    async fn test_missing_collection_reads_as_empty() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call("find", &request(json!({ "db": "app", "collection": "ghosts" })))
            .await
            .unwrap();
        assert_eq!(response["results"], json!([]));
    }

    #[tokio::test]
    async fn test_aggregate() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "aggregate",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "pipeline": [
                        { "$match": { "age": { "$gte": 18 } } },
                        { "$sort": { "age": 1 } },
                        { "$limit": 1 },
                    ],
                })),
            )
            .await
            .unwrap();
        assert_eq!(users(&response, "results"), vec![User::new("Di", 24)]);
    }
}

// ============================================================================
// Cursor Tests
// ============================================================================

mod cursor_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cursor_paging() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "cursor": true,
                    "options": { "sort": { "age": 1 } },
                })),
            )
            .await
            .unwrap();
        let cursor_id = response["cursorId"].as_str().unwrap().to_string();
        assert_eq!(bridge.context().registry().cursors.len().await, 1);

        let next = request(json!({ "cursorId": cursor_id, "batchSize": 3 }));
        let page = bridge.call("cursorGetNext", &next).await.unwrap();
        assert_eq!(
            users(&page, "results"),
            vec![User::new("Bob", 17), User::new("Di", 24), User::new("Ada", 36)]
        );
        assert!(page.get("complete").is_none());

        let page = bridge.call("cursorGetNext", &next).await.unwrap();
        assert_eq!(users(&page, "results"), vec![User::new("Cy", 52)]);

        let page = bridge.call("cursorGetNext", &next).await.unwrap();
        assert_eq!(page["results"], json!([]));
        assert_eq!(page["complete"], true);
        assert!(bridge.context().registry().cursors.is_empty().await);

        let err = bridge.call("cursorGetNext", &next).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle { .. }));
    }

    #[tokio::test]
    async fn test_default_batch_size_is_one() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({ "db": "app", "collection": "users", "cursor": true })),
            )
            .await
            .unwrap();
        let next = request(json!({ "cursorId": response["cursorId"] }));

        let page = bridge.call("cursorGetNext", &next).await.unwrap();
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_batch_size() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({ "db": "app", "collection": "users", "cursor": true })),
            )
            .await
            .unwrap();
        let next = request(json!({ "cursorId": response["cursorId"], "batchSize": 0 }));

        let err = bridge.call("cursorGetNext", &next).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: batchSize must be at least 1");
    }

    #[tokio::test]
    async fn test_close_cursor() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "find",
                &request(json!({ "db": "app", "collection": "users", "cursor": true })),
            )
            .await
            .unwrap();
        let close = request(json!({ "cursorId": response["cursorId"] }));

        let closed = bridge.call("closeCursor", &close).await.unwrap();
        assert_eq!(closed["removed"], true);
        let closed = bridge.call("closeCursor", &close).await.unwrap();
        assert_eq!(closed["removed"], false);
    }

    #[tokio::test]
    async fn test_close_unknown_cursor_succeeds() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call("closeCursor", &request(json!({ "cursorId": "not-a-cursor" })))
            .await
            .unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["removed"], false);
    }
}

// ============================================================================
// Write Tests
// ============================================================================

mod write_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_insert_one_generates_id() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call(
                "insertOne",
                &request(json!({ "db": "app", "collection": "users", "doc": { "name": "Ada" } })),
            )
            .await
            .unwrap();

        let oid = response["insertedId"]["$oid"].as_str().unwrap();
        assert!(ObjectId::parse_str(oid).is_ok());
    }

    #[tokio::test]
    async fn test_insert_binary_envelope() {
        let bridge = Bridge::in_memory();
        let envelope = encode_envelope(&doc! { "_id": 7, "name": "Ada", "age": 36 }).unwrap();
        let response = bridge
            .call(
                "insertOne",
                &request(json!({ "db": "app", "collection": "users", "doc": envelope })),
            )
            .await
            .unwrap();
        assert_eq!(response["insertedId"], 7);

        let found = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "_id": 7 },
                    "useBson": true,
                })),
            )
            .await
            .unwrap();
        assert_eq!(found["results"], json!([envelope]));
    }

    #[tokio::test]
    async fn test_unacknowledged_insert_many() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call(
                "insertMany",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "docs": [{ "name": "Ada" }, { "name": "Bob" }],
                    "options": { "writeConcern": { "w": 0 } },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["insertedCount"], JsonValue::Null);
        assert_eq!(response["insertedIds"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_insert_many_returns_ids_in_order() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call(
                "insertMany",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "docs": [{ "_id": 2 }, { "_id": 1 }],
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["insertedCount"], 2);
        assert_eq!(response["insertedIds"], json!([2, 1]));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "updateMany",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "age": { "$gte": 30 } },
                    "update": { "$inc": { "age": 1 } },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["matchedCount"], 2);
        assert_eq!(response["modifiedCount"], 2);
        assert_eq!(response["upsertedId"], JsonValue::Null);

        let response = bridge
            .call(
                "updateOne",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "name": "Eve" },
                    "update": { "$set": { "age": 40 } },
                    "options": { "upsert": true },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["matchedCount"], 0);
        assert_eq!(response["upsertedCount"], 1);
        assert!(response["upsertedId"]["$oid"].is_string());

        let response = bridge
            .call(
                "deleteMany",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "age": { "$gte": 37 } },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["deletedCount"], 3);
    }

    #[tokio::test]
    async fn test_missing_update_document() {
        let bridge = seeded().await;
        let err = bridge
            .call(
                "updateOne",
                &request(json!({ "db": "app", "collection": "users", "filter": {} })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "update must be provided");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let bridge = Bridge::in_memory();
        bridge
            .call(
                "createIndexes",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "indexes": [[{ "name": 1 }, { "unique": true }]],
                })),
            )
            .await
            .unwrap();

        let insert = request(json!({ "db": "app", "collection": "users", "doc": { "name": "Ada" } }));
        bridge.call("insertOne", &insert).await.unwrap();
        let err = bridge.call("insertOne", &insert).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Driver);
        assert_eq!(err.code(), Some(DUPLICATE_KEY));
        assert!(err.to_string().starts_with("could not execute insertOne: E11000"));
    }
}

// ============================================================================
// Find And Modify Tests
// ============================================================================

mod find_and_modify_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_find_one_and_update_returns_new_document() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "findOneAndUpdate",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "name": "Bob" },
                    "update": { "$set": { "age": 18 } },
                    "options": { "returnNewDocument": true },
                })),
            )
            .await
            .unwrap();
        let user: User = serde_json::from_value(response["doc"].clone()).unwrap();
        assert_eq!(user, User::new("Bob", 18));
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_old_document_by_default() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "findOneAndUpdate",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "name": "Bob" },
                    "update": { "$set": { "age": 18 } },
                })),
            )
            .await
            .unwrap();
        let user: User = serde_json::from_value(response["doc"].clone()).unwrap();
        assert_eq!(user, User::new("Bob", 17));
    }

    #[tokio::test]
    async fn test_find_one_and_delete_without_match() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "findOneAndDelete",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "name": "Nobody" },
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["doc"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_find_one_and_replace() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "findOneAndReplace",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "filter": { "name": "Di" },
                    "replacement": { "name": "Dee", "age": 25 },
                    "options": { "returnNewDocument": true },
                })),
            )
            .await
            .unwrap();
        let user: User = serde_json::from_value(response["doc"].clone()).unwrap();
        assert_eq!(user, User::new("Dee", 25));
    }
}

// ============================================================================
// Bulk Write Tests
// ============================================================================

mod bulk_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn open(bridge: &Bridge) -> String {
        let response = bridge
            .call(
                "newBulkWrite",
                &request(json!({ "db": "app", "collection": "users" })),
            )
            .await
            .unwrap();
        response["operationId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_bulk_execute() {
        let bridge = seeded().await;
        let id = open(&bridge).await;

        bridge
            .call(
                "bulkWriteAddInsertOne",
                &request(json!({ "operationId": id, "doc": { "_id": 100, "name": "Eve" } })),
            )
            .await
            .unwrap();
        bridge
            .call(
                "bulkWriteAddUpdateOne",
                &request(json!({
                    "operationId": id,
                    "filter": { "name": "Zed" },
                    "update": { "$set": { "age": 9 } },
                    "options": { "upsert": true },
                })),
            )
            .await
            .unwrap();
        bridge
            .call(
                "bulkWriteAddDeleteMany",
                &request(json!({ "operationId": id, "filter": { "age": { "$lt": 20 } } })),
            )
            .await
            .unwrap();

        let response = bridge
            .call("bulkWriteExecute", &request(json!({ "operationId": id })))
            .await
            .unwrap();
        assert_eq!(response["insertedCount"], 1);
        assert_eq!(response["insertedIds"], json!([100]));
        assert_eq!(response["upsertedCount"], 1);
        assert_eq!(response["matchedCount"], 0);
        assert_eq!(response["deletedCount"], 2);
        assert!(bridge.context().registry().bulk.is_empty().await);

        let err = bridge
            .call("bulkWriteExecute", &request(json!({ "operationId": id })))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_execute_runs_batch_once() {
        let bridge = Bridge::in_memory();
        let id = open(&bridge).await;
        bridge
            .call(
                "bulkWriteAddInsertOne",
                &request(json!({ "operationId": id, "doc": { "name": "Eve" } })),
            )
            .await
            .unwrap();

        let execute = request(json!({ "operationId": id }));
        let (first, second) = tokio::join!(
            bridge.call("bulkWriteExecute", &execute),
            bridge.call("bulkWriteExecute", &execute),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(BridgeError::InvalidHandle { .. }))));

        let response = bridge
            .call("count", &request(json!({ "db": "app", "collection": "users" })))
            .await
            .unwrap();
        assert_eq!(response["count"], 1);
    }

    #[tokio::test]
    async fn test_failed_execute_keeps_batch() {
        let bridge = Bridge::in_memory();
        let id = open(&bridge).await;
        for _ in 0..2 {
            bridge
                .call(
                    "bulkWriteAddInsertOne",
                    &request(json!({ "operationId": id, "doc": { "_id": 1 } })),
                )
                .await
                .unwrap();
        }

        let err = bridge
            .call("bulkWriteExecute", &request(json!({ "operationId": id })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(DUPLICATE_KEY));
        assert_eq!(bridge.context().registry().bulk.len().await, 1);

        let response = bridge
            .call("bulkWriteCancel", &request(json!({ "operationId": id })))
            .await
            .unwrap();
        assert_eq!(response["removed"], true);
    }

    #[tokio::test]
    async fn test_bulk_cancel() {
        let bridge = Bridge::in_memory();
        let id = open(&bridge).await;

        let response = bridge
            .call("bulkWriteCancel", &request(json!({ "operationId": id })))
            .await
            .unwrap();
        assert_eq!(response["removed"], true);

        let err = bridge
            .call(
                "bulkWriteAddDeleteOne",
                &request(json!({ "operationId": id, "filter": {} })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("{id} does not refer to a valid bulk operation"));
    }

    #[tokio::test]
    async fn test_bulk_requires_operation_id() {
        let bridge = Bridge::in_memory();
        let err = bridge
            .call("bulkWriteAddInsertOne", &request(json!({ "doc": {} })))
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
    }
}

// ============================================================================
// Index Tests
// ============================================================================

mod index_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_list_and_drop() {
        let bridge = seeded().await;
        let response = bridge
            .call(
                "createIndexes",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "indexes": [[{ "age": -1 }], [{ "name": 1 }, { "name": "by_name" }]],
                })),
            )
            .await
            .unwrap();
        assert_eq!(response["indexesCreated"], json!(["age_-1", "by_name"]));

        let list = request(json!({ "db": "app", "collection": "users" }));
        let response = bridge.call("listIndexes", &list).await.unwrap();
        let names: Vec<&str> = response["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|index| index["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["_id_", "age_-1", "by_name"]);

        let response = bridge
            .call(
                "dropIndex",
                &request(json!({ "db": "app", "collection": "users", "keys": { "age": -1 } })),
            )
            .await
            .unwrap();
        assert_eq!(response["done"], true);

        let response = bridge.call("listIndexes", &list).await.unwrap();
        assert_eq!(response["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_indexes() {
        let bridge = Bridge::in_memory();
        let err = bridge
            .call(
                "createIndexes",
                &request(json!({ "db": "app", "collection": "users", "indexes": [] })),
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
    }
}

// ============================================================================
// Database Tests
// ============================================================================

mod database_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_collections_and_databases() {
        let bridge = seeded().await;
        bridge
            .call(
                "createCollection",
                &request(json!({
                    "db": "app",
                    "collection": "events",
                    "options": { "capped": true, "size": 4096, "max": 10 },
                })),
            )
            .await
            .unwrap();

        let response = bridge
            .call("listCollections", &request(json!({ "db": "app" })))
            .await
            .unwrap();
        let names: Vec<&str> = response["collections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["events", "users"]);

        let response = bridge
            .call("listDatabases", &GenericDocument::new())
            .await
            .unwrap();
        assert_eq!(response["databases"][0]["name"], "app");

        let response = bridge
            .call("dropCollection", &request(json!({ "db": "app", "collection": "events" })))
            .await
            .unwrap();
        assert_eq!(response["dropped"], true);

        let response = bridge
            .call("dropDatabase", &request(json!({ "db": "app" })))
            .await
            .unwrap();
        assert_eq!(response["dropped"], true);
    }

    #[tokio::test]
    async fn test_run_command_ping() {
        let bridge = Bridge::in_memory();
        let response = bridge
            .call(
                "runCommand",
                &request(json!({ "db": "admin", "command": { "ping": 1 } })),
            )
            .await
            .unwrap();
        assert_eq!(response["reply"]["ok"], 1.0);
    }
}

// ============================================================================
// Error Tests
// ============================================================================

mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_missing_db_and_collection() {
        let bridge = Bridge::in_memory();

        let err = bridge
            .call("find", &request(json!({ "collection": "users" })))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingDbName));

        let err = bridge
            .call("find", &request(json!({ "db": "app" })))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingCollectionName));
        assert_eq!(
            err.to_string(),
            "collection name must be provided and must be a string"
        );
    }

    #[tokio::test]
    async fn test_invalid_collation_is_rejected() {
        let bridge = seeded().await;
        let err = bridge
            .call(
                "find",
                &request(json!({
                    "db": "app",
                    "collection": "users",
                    "options": { "collation": { "locale": "en", "caseFirst": "sideways" } },
                })),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Parse(_)));
        assert!(err.to_string().contains("caseFirst"));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let bridge = Bridge::in_memory();
        let response: JsonValue =
            serde_json::from_str(&bridge.call_json("teleport", "{}").await).unwrap();
        assert_eq!(response["success"], false);
        assert_eq!(response["message"], "unknown method: teleport");
    }

    #[tokio::test]
    async fn test_error_response_carries_code() {
        let bridge = Bridge::in_memory();
        let response: JsonValue = serde_json::from_str(
            &bridge
                .call_json(
                    "runCommand",
                    r#"{"db": "app", "command": {"frobnicate": 1}}"#,
                )
                .await,
        )
        .unwrap();
        assert_eq!(response["kind"], "driver");
        assert!(response["code"].is_number());
    }
}
