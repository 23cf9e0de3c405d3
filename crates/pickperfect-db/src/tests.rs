use pickperfect_core::{Collection, Document, DocumentId, ID_FIELD};
use pickperfect_util_error::BoxedErrorResult;
use serde_json::json;
use snafu::ResultExt as _;
use tempfile::{TempDir, tempdir};

use crate::{Database, DbError, DeleteResult, UpdateResult};

async fn temp_db() -> BoxedErrorResult<(TempDir, Database)> {
    let dir = tempdir()?;
    let db = Database::open(dir.path().join("db.redb")).await.boxed()?;

    Ok((dir, db))
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("Must be an object")
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn insert_then_find_all_returns_documents_in_insertion_order() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;

    let first = db
        .insert_one(Collection::Queries, doc(json!({ "title": "first" })))
        .await?;
    let second = db
        .insert_one(Collection::Queries, doc(json!({ "title": "second" })))
        .await?;
    assert!(first.acknowledged);

    let all = db.find_all(Collection::Queries).await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0][ID_FIELD], json!(first.inserted_id.to_string()));
    assert_eq!(all[0]["title"], json!("first"));
    assert_eq!(all[1][ID_FIELD], json!(second.inserted_id.to_string()));

    assert!(db.find_all(Collection::Recommendations).await?.is_empty());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn insert_ignores_client_provided_id() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;

    let res = db
        .insert_one(
            Collection::Recommendations,
            doc(json!({ "_id": "65a1b2c3d4e5f60718293a4b", "text": "x" })),
        )
        .await?;

    assert_ne!(res.inserted_id.to_string(), "65a1b2c3d4e5f60718293a4b");
    let stored = db
        .find_one(Collection::Recommendations, res.inserted_id)
        .await?
        .expect("Must exist");
    assert_eq!(stored[ID_FIELD], json!(res.inserted_id.to_string()));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn update_set_merges_fields_and_reports_modification() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let id = db
        .insert_one(Collection::Queries, doc(json!({ "a": 1, "b": 2 })))
        .await?
        .inserted_id;

    let res = db
        .update_set(Collection::Queries, id, doc(json!({ "b": 3, "c": 4 })))
        .await?;
    assert_eq!(res, UpdateResult::matched(true));

    let stored = db.find_one(Collection::Queries, id).await?.expect("Exists");
    assert_eq!(
        serde_json::Value::Object(stored),
        json!({ "_id": id.to_string(), "a": 1, "b": 3, "c": 4 })
    );

    let res = db
        .update_set(Collection::Queries, id, doc(json!({ "b": 3 })))
        .await?;
    assert_eq!(res.matched_count, 1);
    assert_eq!(res.modified_count, 0);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn update_set_cannot_change_id() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let id = db
        .insert_one(Collection::Queries, doc(json!({})))
        .await?
        .inserted_id;

    db.update_set(
        Collection::Queries,
        id,
        doc(json!({ "_id": "000000000000000000000000" })),
    )
    .await?;

    let stored = db.find_one(Collection::Queries, id).await?.expect("Exists");
    assert_eq!(stored[ID_FIELD], json!(id.to_string()));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn update_of_missing_document_matches_nothing() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;

    let res = db
        .update_set(
            Collection::Queries,
            DocumentId::generate(),
            doc(json!({ "a": 1 })),
        )
        .await?;
    assert_eq!(res, UpdateResult::unmatched());

    let res = db
        .increment(Collection::Queries, DocumentId::generate(), "n", 1)
        .await?;
    assert_eq!(res.matched_count, 0);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn increment_creates_adds_and_subtracts() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let id = db
        .insert_one(Collection::Queries, doc(json!({ "ratio": 0.5 })))
        .await?
        .inserted_id;

    db.increment(Collection::Queries, id, "recommendationCount", 1)
        .await?;
    db.increment(Collection::Queries, id, "recommendationCount", 1)
        .await?;
    db.increment(Collection::Queries, id, "recommendationCount", -1)
        .await?;
    db.increment(Collection::Queries, id, "ratio", 1).await?;

    let stored = db.find_one(Collection::Queries, id).await?.expect("Exists");
    assert_eq!(stored["recommendationCount"], json!(1));
    assert_eq!(stored["ratio"], json!(1.5));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn increment_of_non_numeric_field_fails() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let id = db
        .insert_one(Collection::Queries, doc(json!({ "title": "x" })))
        .await?
        .inserted_id;

    let err = db
        .increment(Collection::Queries, id, "title", 1)
        .await
        .expect_err("Must fail");
    assert!(matches!(err, DbError::NonNumericField { .. }));
    assert!(err.is_user_error());

    let stored = db.find_one(Collection::Queries, id).await?.expect("Exists");
    assert_eq!(stored["title"], json!("x"));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn delete_one_reports_count() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let id = db
        .insert_one(Collection::Recommendations, doc(json!({})))
        .await?
        .inserted_id;

    assert_eq!(
        db.delete_one(Collection::Recommendations, id).await?,
        DeleteResult::deleted(1)
    );
    assert_eq!(
        db.delete_one(Collection::Recommendations, id).await?,
        DeleteResult::deleted(0)
    );
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn delete_many_by_field_removes_only_matching() -> BoxedErrorResult<()> {
    let (_dir, db) = temp_db().await?;
    let post = DocumentId::generate().to_string();

    for post_id in [json!(post), json!(post), json!("other"), json!(42)] {
        db.insert_one(
            Collection::Recommendations,
            doc(json!({ "postID": post_id })),
        )
        .await?;
    }

    let res = db
        .delete_many_by_field(Collection::Recommendations, "postID", &post)
        .await?;
    assert_eq!(res.deleted_count, 2);

    let left = db.find_all(Collection::Recommendations).await?;
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|d| d["postID"] != json!(post)));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn data_survives_reopen() -> BoxedErrorResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("db.redb");

    let id = {
        let db = Database::open(&path).await.boxed()?;
        db.insert_one(Collection::Queries, doc(json!({ "keep": true })))
            .await?
            .inserted_id
    };

    let db = Database::open(&path).await.boxed()?;
    db.ping().await?;
    assert!(db.find_one(Collection::Queries, id).await?.is_some());
    Ok(())
}
