//! Resume against the durable stores used in production.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use regcheck::config::GlobalConfig;
use regcheck::models::checkpoint::ProgressCheckpoint;
use regcheck::models::item::ValidationItem;
use regcheck::models::report::RunReport;
use regcheck::models::result::ValidationResult;
use regcheck::orchestrator::queue::WorkQueue;
use regcheck::orchestrator::recorder::Recorder;
use regcheck::orchestrator::scheduler::Scheduler;
use regcheck::persistence::db;
use regcheck::persistence::jsonl_writer::JsonlResultWriter;
use regcheck::persistence::progress_repo::ProgressRepo;
use regcheck::persistence::result_repo::ResultRepo;
use regcheck::persistence::{ProgressStore, ResultSink};

use super::test_helpers::{fast_config, normalized, numbers, start_pool, MockTransport, RUN_KEY};

fn even_registered() -> MockTransport {
    MockTransport::registering(|id| id.ends_with(['0', '2', '4', '6', '8']))
}

async fn run_persisted(
    config: &GlobalConfig,
    transport: &Arc<MockTransport>,
    items: Vec<ValidationItem>,
    sink: Arc<dyn ResultSink>,
    store: Arc<dyn ProgressStore>,
) -> RunReport {
    let checkpoint = store.load_or_default(RUN_KEY).await.unwrap();
    let recorded = sink.recorded_indices().await.unwrap();
    let queue = Arc::new(WorkQueue::resume(items, &checkpoint, &recorded));
    let recorder = Arc::new(tokio::sync::Mutex::new(Recorder::new(
        sink,
        store,
        checkpoint,
        config.checkpoint.every,
        &recorded,
    )));
    let mut pool = start_pool(config, &[Arc::clone(transport)]).await;
    let report = Scheduler::new(config.sessions.concurrency)
        .run(&mut pool, queue, recorder, CancellationToken::new())
        .await
        .unwrap();
    pool.shutdown().await;
    report
}

#[tokio::test]
async fn resume_skips_offsets_before_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let database = Arc::new(db::connect(&dir.path().join("progress.db")).await.unwrap());
    let progress = Arc::new(ProgressRepo::new(Arc::clone(&database)));
    let results = Arc::new(ResultRepo::new(Arc::clone(&database), RUN_KEY));

    let mut checkpoint = ProgressCheckpoint::new(RUN_KEY);
    checkpoint.last_index = 6;
    progress.upsert(&checkpoint).await.unwrap();

    let config = fast_config();
    let transport = Arc::new(even_registered());
    let report = run_persisted(
        &config,
        &transport,
        numbers(15),
        Arc::clone(&results) as Arc<dyn ResultSink>,
        Arc::clone(&progress) as Arc<dyn ProgressStore>,
    )
    .await;

    assert_eq!(report.queued, 9);
    assert_eq!(transport.check_count(), 9);
    let stored = results.list_for_run().await.unwrap();
    assert_eq!(stored.len(), 9);
    assert!(stored.iter().all(|r| r.index >= 6));
    assert_eq!(stored[0].normalized_id, normalized(6));

    let saved = progress.get(RUN_KEY).await.unwrap().unwrap();
    assert_eq!(saved.last_index, 15);
    assert_eq!(saved.total_checked, 9);
    assert_eq!(saved.start_time, checkpoint.start_time);
}

#[tokio::test]
async fn resumed_counts_match_fresh_run_on_remainder() {
    let config = fast_config();

    let dir = tempfile::tempdir().unwrap();
    let database = Arc::new(db::connect(&dir.path().join("progress.db")).await.unwrap());
    let progress = Arc::new(ProgressRepo::new(Arc::clone(&database)));
    let mut checkpoint = ProgressCheckpoint::new(RUN_KEY);
    checkpoint.last_index = 8;
    progress.upsert(&checkpoint).await.unwrap();

    let resumed = run_persisted(
        &config,
        &Arc::new(even_registered()),
        numbers(30),
        Arc::new(ResultRepo::new(Arc::clone(&database), RUN_KEY)),
        Arc::clone(&progress) as Arc<dyn ProgressStore>,
    )
    .await;

    let other = Arc::new(db::connect_memory().await.unwrap());
    let remainder: Vec<ValidationItem> = numbers(30).into_iter().skip(8).collect();
    let fresh = run_persisted(
        &config,
        &Arc::new(even_registered()),
        remainder,
        Arc::new(ResultRepo::new(Arc::clone(&other), RUN_KEY)),
        Arc::new(ProgressRepo::new(Arc::clone(&other))),
    )
    .await;

    assert_eq!(resumed.checked, fresh.checked);
    assert_eq!(resumed.verified, fresh.verified);
    assert_eq!(resumed.not_registered, fresh.not_registered);
    assert_eq!(resumed.errors, fresh.errors);
}

#[tokio::test]
async fn results_written_past_watermark_are_not_rechecked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    let database = Arc::new(db::connect(&dir.path().join("progress.db")).await.unwrap());
    let progress = Arc::new(ProgressRepo::new(Arc::clone(&database)));

    // Crash after appending index 7 but before the checkpoint moved past 3.
    {
        let writer = JsonlResultWriter::open(&path).unwrap();
        let done: Vec<ValidationResult> = numbers(15)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| [0, 1, 2, 7].contains(i))
            .map(|(i, item)| ValidationResult::success(i, item, normalized(i), false, "session-1", 1))
            .collect();
        writer.append(&done).await.unwrap();
        let mut checkpoint = ProgressCheckpoint::new(RUN_KEY);
        checkpoint.last_index = 3;
        checkpoint.total_checked = 3;
        progress.upsert(&checkpoint).await.unwrap();
    }

    let config = fast_config();
    let transport = Arc::new(MockTransport::silent());
    let writer = Arc::new(JsonlResultWriter::open(&path).unwrap());
    run_persisted(
        &config,
        &transport,
        numbers(15),
        Arc::clone(&writer) as Arc<dyn ResultSink>,
        Arc::clone(&progress) as Arc<dyn ProgressStore>,
    )
    .await;

    assert_eq!(transport.check_count(), 11);
    let all = writer.read_all().unwrap();
    let indices: HashSet<usize> = all.iter().map(|r| r.index).collect();
    assert_eq!(all.len(), 15);
    assert_eq!(indices, (0..15).collect());

    let saved = progress.get(RUN_KEY).await.unwrap().unwrap();
    assert_eq!(saved.last_index, 15);
    assert_eq!(saved.total_checked, 14);
}
