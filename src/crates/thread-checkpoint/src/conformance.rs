//! Behavioural checks every [`CheckpointSaver`] backend must pass
//!
//! Each check writes to its own thread ids, so the suite can run against a
//! shared store. Store errors are returned; contract violations panic with an
//! assertion message. Backends call [`run_all`] from their test suites:
//!
//! ```rust
//! # #[tokio::main]
//! # async fn main() -> thread_checkpoint::Result<()> {
//! use thread_checkpoint::{conformance, InMemoryCheckpointSaver};
//!
//! conformance::run_all(&InMemoryCheckpointSaver::new()).await?;
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, CheckpointTuple,
};
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointSaver;
use futures::TryStreamExt;
use serde_json::json;
use std::collections::HashMap;

async fn put(
    saver: &dyn CheckpointSaver,
    config: &CheckpointConfig,
    metadata: CheckpointMetadata,
) -> Result<CheckpointConfig> {
    saver
        .put(config, Checkpoint::empty(), metadata, HashMap::new())
        .await
}

async fn list_ids(
    saver: &dyn CheckpointSaver,
    thread_id: &str,
    before: Option<&CheckpointConfig>,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let tuples: Vec<CheckpointTuple> = saver
        .list(Some(&CheckpointConfig::for_thread(thread_id)), None, before, limit)
        .await?
        .try_collect()
        .await?;
    Ok(tuples.into_iter().map(|tuple| tuple.checkpoint.id).collect())
}

fn id_of(config: &CheckpointConfig) -> String {
    config.checkpoint_id.clone().unwrap_or_default()
}

/// C1 → C2 → C3: latest, limit and strict `before` cursor
pub async fn check_chain_scenario(saver: &dyn CheckpointSaver) -> Result<()> {
    let thread = "u_1";
    let c1 = put(saver, &CheckpointConfig::for_thread(thread), CheckpointMetadata::new()).await?;
    let c2 = put(saver, &c1, CheckpointMetadata::new()).await?;
    let c3 = put(saver, &c2, CheckpointMetadata::new()).await?;

    let latest = saver
        .get_tuple(&CheckpointConfig::for_thread(thread))
        .await?
        .expect("thread has checkpoints");
    assert_eq!(latest.checkpoint.id, id_of(&c3), "get without id returns latest");
    assert_eq!(latest.parent_checkpoint_id(), c2.checkpoint_id.as_deref());

    let middle = saver.get_tuple(&c2).await?.expect("c2 exists");
    assert_eq!(middle.parent_checkpoint_id(), c1.checkpoint_id.as_deref());

    assert_eq!(list_ids(saver, thread, None, Some(2)).await?, vec![id_of(&c3), id_of(&c2)]);
    assert_eq!(list_ids(saver, thread, Some(&c2), None).await?, vec![id_of(&c1)]);
    Ok(())
}

/// Latest is the greatest checkpoint id, whatever the write order
pub async fn check_latest_is_max_id(saver: &dyn CheckpointSaver) -> Result<()> {
    let config = CheckpointConfig::for_thread("conformance-latest_1");
    for id in ["0003", "0001", "0002"] {
        let mut checkpoint = Checkpoint::empty();
        checkpoint.id = id.to_string();
        saver
            .put(&config, checkpoint, CheckpointMetadata::new(), HashMap::new())
            .await?;
    }
    let latest = saver.get(&config).await?.expect("thread has checkpoints");
    assert_eq!(latest.id, "0003");

    let exact = saver
        .get(&config.clone().with_checkpoint_id("0001"))
        .await?
        .expect("0001 exists");
    assert_eq!(exact.id, "0001");

    assert!(saver
        .get(&config.with_checkpoint_id("9999"))
        .await?
        .is_none());
    Ok(())
}

/// Repeating a put with the same ids leaves the list length unchanged
pub async fn check_put_is_idempotent(saver: &dyn CheckpointSaver) -> Result<()> {
    let thread = "conformance-idempotent_1";
    let config = CheckpointConfig::for_thread(thread);
    let checkpoint = Checkpoint::empty().with_channel_value("messages", json!([{"type": "human", "content": "hi"}]));

    let first = saver
        .put(&config, checkpoint.clone(), CheckpointMetadata::new().with_step(0), HashMap::new())
        .await?;
    let before = saver.get_tuple(&first).await?.expect("stored");
    let second = saver
        .put(&config, checkpoint.clone(), CheckpointMetadata::new().with_step(0), HashMap::new())
        .await?;
    let after = saver.get_tuple(&second).await?.expect("stored");

    assert_eq!(first, second);
    assert_eq!(list_ids(saver, thread, None, None).await?.len(), 1);
    assert_eq!(after.checkpoint, checkpoint);
    assert_eq!(after.created_at, before.created_at, "upsert keeps created_at");
    assert!(after.updated_at >= before.updated_at);
    Ok(())
}

/// Threads never see each other's checkpoints
pub async fn check_thread_isolation(saver: &dyn CheckpointSaver) -> Result<()> {
    let a = put(saver, &CheckpointConfig::for_thread("conformance-iso_a"), CheckpointMetadata::new()).await?;
    put(saver, &CheckpointConfig::for_thread("conformance-iso_b"), CheckpointMetadata::new()).await?;

    assert_eq!(list_ids(saver, "conformance-iso_a", None, None).await?, vec![id_of(&a)]);

    // A checkpoint id from another thread is not found
    let foreign = CheckpointConfig::for_thread("conformance-iso_b").with_checkpoint_id(id_of(&a));
    assert!(saver.get_tuple(&foreign).await?.is_none());
    Ok(())
}

/// Metadata filters match top-level fields exactly, all of them
pub async fn check_metadata_filter(saver: &dyn CheckpointSaver) -> Result<()> {
    let thread = "conformance-filter_1";
    let c1 = put(
        saver,
        &CheckpointConfig::for_thread(thread),
        CheckpointMetadata::new().with_source(CheckpointSource::Input).with_step(-1),
    )
    .await?;
    let c2 = put(
        saver,
        &c1,
        CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(0)
            .with_extra("approved", json!(true)),
    )
    .await?;
    put(
        saver,
        &c2,
        CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(1)
            .with_extra("tag", json!(null))
            .with_extra("flag", json!(1)),
    )
    .await?;

    let scoped = CheckpointConfig::for_thread(thread);
    let count = |filter: HashMap<String, serde_json::Value>| {
        let scoped = scoped.clone();
        async move {
            let tuples: Vec<CheckpointTuple> = saver
                .list(Some(&scoped), Some(filter), None, None)
                .await?
                .try_collect()
                .await?;
            Ok::<_, CheckpointError>(tuples.len())
        }
    };

    assert_eq!(count(HashMap::from([("source".to_string(), json!("loop"))])).await?, 2);
    assert_eq!(
        count(HashMap::from([
            ("source".to_string(), json!("loop")),
            ("step".to_string(), json!(0)),
        ]))
        .await?,
        1
    );
    assert_eq!(count(HashMap::from([("approved".to_string(), json!(true))])).await?, 1);
    assert_eq!(count(HashMap::from([("approved".to_string(), json!(false))])).await?, 0);

    // JSON equality: null matches null, booleans and numbers stay distinct
    assert_eq!(count(HashMap::from([("tag".to_string(), json!(null))])).await?, 1);
    assert_eq!(count(HashMap::from([("missing".to_string(), json!(null))])).await?, 0);
    assert_eq!(count(HashMap::from([("flag".to_string(), json!(1))])).await?, 1);
    assert_eq!(count(HashMap::from([("flag".to_string(), json!(true))])).await?, 0);
    assert_eq!(count(HashMap::from([("flag".to_string(), json!(1.0))])).await?, 0);
    assert_eq!(count(HashMap::from([("flag".to_string(), json!("1"))])).await?, 0);
    assert_eq!(count(HashMap::from([("approved".to_string(), json!(1))])).await?, 0);
    assert_eq!(count(HashMap::new()).await?, 3);
    Ok(())
}

/// Paging with `before` + `limit` visits every checkpoint exactly once
pub async fn check_cursor_pagination(saver: &dyn CheckpointSaver) -> Result<()> {
    let thread = "conformance-paging_1";
    let mut config = CheckpointConfig::for_thread(thread);
    for _ in 0..7 {
        config = put(saver, &config, CheckpointMetadata::new()).await?;
    }

    let full = list_ids(saver, thread, None, None).await?;
    assert_eq!(full.len(), 7);
    let mut sorted = full.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(full, sorted, "newest first");

    for extra in 0..3 {
        assert_eq!(list_ids(saver, thread, None, Some(full.len() + extra)).await?, full);
    }

    let mut paged = Vec::new();
    let mut cursor: Option<CheckpointConfig> = None;
    loop {
        let page = list_ids(saver, thread, cursor.as_ref(), Some(3)).await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(CheckpointConfig::for_thread(thread).with_checkpoint_id(last.clone()));
        paged.extend(page);
    }
    assert_eq!(paged, full);
    Ok(())
}

/// Pending writes are kept per task in write order and replaced on resubmission
pub async fn check_pending_writes(saver: &dyn CheckpointSaver) -> Result<()> {
    let config = put(
        saver,
        &CheckpointConfig::for_thread("conformance-writes_1"),
        CheckpointMetadata::new(),
    )
    .await?;

    saver
        .put_writes(
            &config,
            vec![
                ("b".to_string(), json!(2)),
                ("a".to_string(), json!({"nested": [1, 2]})),
            ],
            "task-2".to_string(),
        )
        .await?;
    saver
        .put_writes(&config, vec![("x".to_string(), json!("first"))], "task-1".to_string())
        .await?;
    saver
        .put_writes(&config, vec![("x".to_string(), json!("retried"))], "task-1".to_string())
        .await?;

    let expected = vec![
        ("task-1".to_string(), "x".to_string(), json!("retried")),
        ("task-2".to_string(), "b".to_string(), json!(2)),
        ("task-2".to_string(), "a".to_string(), json!({"nested": [1, 2]})),
    ];
    assert_eq!(saver.get_writes(&config).await?, expected);
    let tuple = saver.get_tuple(&config).await?.expect("stored");
    assert_eq!(tuple.pending_writes, expected);

    // Writes may precede their checkpoint
    let early = CheckpointConfig::for_thread("conformance-writes_1").with_checkpoint_id("not-yet");
    saver
        .put_writes(&early, vec![("x".to_string(), json!(1))], "task-1".to_string())
        .await?;
    assert_eq!(saver.get_writes(&early).await?.len(), 1);
    Ok(())
}

/// Nothing of a deleted thread remains readable
pub async fn check_delete_thread(saver: &dyn CheckpointSaver) -> Result<()> {
    let thread = "conformance-delete_1";
    let c1 = put(saver, &CheckpointConfig::for_thread(thread), CheckpointMetadata::new()).await?;
    let c2 = put(saver, &c1, CheckpointMetadata::new()).await?;
    saver
        .put_writes(&c2, vec![("x".to_string(), json!(1))], "task".to_string())
        .await?;
    let survivor = put(
        saver,
        &CheckpointConfig::for_thread("conformance-delete_2"),
        CheckpointMetadata::new(),
    )
    .await?;

    saver.delete_thread(thread).await?;

    assert!(saver.get_tuple(&CheckpointConfig::for_thread(thread)).await?.is_none());
    assert!(saver.get_tuple(&c1).await?.is_none());
    assert!(list_ids(saver, thread, None, None).await?.is_empty());
    assert!(saver.get_writes(&c2).await?.is_empty());
    assert!(saver.get_tuple(&survivor).await?.is_some());

    // Deleting again is a no-op
    saver.delete_thread(thread).await?;

    // The thread id is reusable from scratch
    let fresh = put(saver, &CheckpointConfig::for_thread(thread), CheckpointMetadata::new()).await?;
    assert_eq!(list_ids(saver, thread, None, None).await?, vec![id_of(&fresh)]);
    Ok(())
}

/// Blank thread ids are rejected with `InvalidReference`
pub async fn check_invalid_references(saver: &dyn CheckpointSaver) -> Result<()> {
    let blank = CheckpointConfig::for_thread("");
    let is_invalid = |result: Result<()>| matches!(result, Err(CheckpointError::InvalidReference(_)));

    assert!(is_invalid(saver.get_tuple(&blank).await.map(|_| ())));
    assert!(is_invalid(saver.get_tuple(&CheckpointConfig::new()).await.map(|_| ())));
    assert!(is_invalid(
        saver
            .put(&blank, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .map(|_| ())
    ));
    assert!(is_invalid(saver.list(Some(&blank), None, None, None).await.map(|_| ())));
    assert!(is_invalid(
        saver
            .put_writes(&blank.clone().with_checkpoint_id("c"), Vec::new(), "t".to_string())
            .await
    ));
    assert!(is_invalid(saver.delete_thread("  ").await));

    // A parent that does not exist in the thread is rejected too
    let dangling = CheckpointConfig::for_thread("conformance-invalid_1").with_checkpoint_id("missing");
    assert!(is_invalid(
        saver
            .put(&dangling, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .map(|_| ())
    ));
    Ok(())
}

/// Owner scoping: alice owns two threads, bob one
pub async fn check_owner_listing(saver: &dyn CheckpointSaver) -> Result<()> {
    let mut latest = HashMap::new();
    for thread in ["alice_1", "alice_2_support", "bob_1"] {
        let stored = put(saver, &CheckpointConfig::for_thread(thread), CheckpointMetadata::new()).await?;
        latest.insert(thread, id_of(&stored));
    }
    let again = put(saver, &CheckpointConfig::for_thread("alice_1"), CheckpointMetadata::new()).await?;
    latest.insert("alice_1", id_of(&again));

    let mut alice = saver.thread_stats(Some("alice")).await?;
    alice.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
    let ids: Vec<&str> = alice.iter().map(|stats| stats.thread_id.as_str()).collect();
    assert_eq!(ids, vec!["alice_1", "alice_2_support"]);
    assert_eq!(alice[0].checkpoint_count, 2);
    assert_eq!(alice[0].latest_checkpoint_id, latest["alice_1"]);
    assert_eq!(alice[1].checkpoint_count, 1);

    let everyone = saver.thread_stats(None).await?;
    for thread in ["alice_1", "alice_2_support", "bob_1"] {
        let stats = everyone
            .iter()
            .find(|stats| stats.thread_id == thread)
            .expect("every thread is listed");
        assert_eq!(stats.latest_checkpoint_id, latest[thread]);
    }
    Ok(())
}

/// Concurrent chained puts on distinct threads all land, each chain intact
pub async fn check_concurrent_puts(saver: &dyn CheckpointSaver) -> Result<()> {
    const THREADS: usize = 8;
    const STEPS: usize = 10;

    let chains = (0..THREADS).map(|n| async move {
        let thread = format!("conformance-concurrent_{}", n);
        let mut config = CheckpointConfig::for_thread(&thread);
        for step in 0..STEPS {
            config = saver
                .put(
                    &config,
                    Checkpoint::empty(),
                    CheckpointMetadata::new().with_step(step as i32),
                    HashMap::new(),
                )
                .await?;
        }
        Ok::<_, CheckpointError>((thread, config))
    });
    let finished = futures::future::try_join_all(chains).await?;

    for (thread, last) in finished {
        let ids = list_ids(saver, &thread, None, None).await?;
        assert_eq!(ids.len(), STEPS, "every put of {} is stored", thread);
        assert_eq!(ids.first(), last.checkpoint_id.as_ref());

        let mut cursor = saver.get_tuple(&last).await?;
        let mut walked = 0;
        while let Some(tuple) = cursor {
            walked += 1;
            cursor = match tuple.parent_config {
                Some(parent) => saver.get_tuple(&parent).await?,
                None => None,
            };
        }
        assert_eq!(walked, STEPS, "parent chain of {} is unbroken", thread);
    }
    Ok(())
}

/// Run every check against one backend
pub async fn run_all(saver: &dyn CheckpointSaver) -> Result<()> {
    check_chain_scenario(saver).await?;
    check_latest_is_max_id(saver).await?;
    check_put_is_idempotent(saver).await?;
    check_thread_isolation(saver).await?;
    check_metadata_filter(saver).await?;
    check_cursor_pagination(saver).await?;
    check_pending_writes(saver).await?;
    check_delete_thread(saver).await?;
    check_invalid_references(saver).await?;
    check_owner_listing(saver).await?;
    check_concurrent_puts(saver).await?;
    Ok(())
}
