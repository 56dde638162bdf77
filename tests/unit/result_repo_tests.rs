//! Unit tests for `ResultRepo` result persistence.

use std::sync::Arc;

use regcheck::models::item::ValidationItem;
use regcheck::models::result::{CheckStatus, ValidationResult};
use regcheck::persistence::result_repo::ResultRepo;
use regcheck::persistence::{db, ResultSink};

fn registered(index: usize) -> ValidationResult {
    let item = ValidationItem::new(format!("07900000{index:02}")).with_metadata("name", "Lina");
    let mut result = ValidationResult::success(
        index,
        item,
        format!("96279000000{index:02}"),
        true,
        "session-2",
        2,
    );
    result.profile = Some(serde_json::json!({"about": "hello"}));
    result
}

#[tokio::test]
async fn append_and_list_round_trip() {
    let repo = ResultRepo::new(Arc::new(db::connect_memory().await.expect("db")), "run");
    let written = vec![
        registered(1),
        ValidationResult::error(
            0,
            ValidationItem::new("abc"),
            String::new(),
            "invalid number: number contains no digits".into(),
            "session-1",
            0,
        ),
    ];

    repo.append(&written).await.expect("append");
    let listed = repo.list_for_run().await.expect("list");

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], written[1], "ordered by input offset");
    assert_eq!(listed[1], written[0]);
    assert_eq!(listed[1].item.metadata.get("name").map(String::as_str), Some("Lina"));
    assert_eq!(listed[0].status, CheckStatus::Error);
}

#[tokio::test]
async fn recorded_indices_and_count_are_scoped_to_run() {
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let run_a = ResultRepo::new(Arc::clone(&pool), "a");
    let run_b = ResultRepo::new(pool, "b");

    run_a.append(&[registered(3), registered(4)]).await.unwrap();
    run_b.append(&[registered(9)]).await.unwrap();

    let indices = run_a.recorded_indices().await.unwrap();
    assert_eq!(indices, [3, 4].into_iter().collect());
    assert_eq!(run_a.count_for_run().await.unwrap(), 2);
    assert_eq!(run_b.count_for_run().await.unwrap(), 1);
    assert_eq!(run_a.run_key(), "a");
}

#[tokio::test]
async fn failed_batch_is_not_partially_written() {
    let repo = ResultRepo::new(Arc::new(db::connect_memory().await.expect("db")), "run");
    let first = registered(0);
    repo.append(std::slice::from_ref(&first)).await.unwrap();

    // Reusing the id violates the primary key on the second row.
    let batch = vec![registered(1), first];
    assert!(repo.append(&batch).await.is_err());
    assert_eq!(repo.count_for_run().await.unwrap(), 1);
}

#[tokio::test]
async fn delete_for_run_clears_results() {
    let repo = ResultRepo::new(Arc::new(db::connect_memory().await.expect("db")), "run");
    repo.append(&[registered(0)]).await.unwrap();
    repo.delete_for_run().await.unwrap();
    assert_eq!(repo.count_for_run().await.unwrap(), 0);
}
