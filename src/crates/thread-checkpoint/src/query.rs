//! Read models over a checkpoint store
//!
//! [`ThreadQueries`] answers the three views the transport layer serves:
//!
//! - **threads**: checkpoints grouped per thread, paginated over the groups
//! - **history**: the raw checkpoint chain of one thread, each with its messages
//! - **messages**: the latest checkpoint's message list, de-duplicated and
//!   paginated one message at a time
//!
//! A thread that does not exist yields an empty page with `total: 0`.

use crate::api::{
    CheckpointSummary, DeleteThreadRequest, DeleteThreadResponse, HistoryItem, HistoryRequest,
    HistoryResponse, ListThreadsRequest, MessagesRequest, MessagesResponse, SortOrder,
    ThreadListResponse, ThreadSummary,
};
use crate::checkpoint::{CheckpointConfig, CheckpointTuple, ThreadStats};
use crate::error::{CheckpointError, Result};
use crate::messages::{first_message_preview, format_messages};
use crate::thread_id::{config_id_of, owner_of, UNKNOWN_CONFIG_ID};
use crate::traits::CheckpointSaver;
use futures::future::try_join_all;
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query layer over any [`CheckpointSaver`]
#[derive(Clone)]
pub struct ThreadQueries {
    saver: Arc<dyn CheckpointSaver>,
}

impl ThreadQueries {
    pub fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    /// The underlying store
    pub fn saver(&self) -> &Arc<dyn CheckpointSaver> {
        &self.saver
    }

    /// Threads grouped from their checkpoints, ordered by last update
    ///
    /// Only the latest checkpoint of each thread on the requested page is decoded. A
    /// thread whose latest checkpoint cannot be decoded is still listed, with an empty
    /// preview.
    pub async fn list_threads(&self, request: &ListThreadsRequest) -> Result<ThreadListResponse> {
        request.page.validate()?;
        let owner = request.owner.as_deref().filter(|owner| !owner.is_empty());

        let mut stats = self.saver.thread_stats(owner).await?;
        stats.sort_by(|a, b| {
            a.last_updated
                .cmp(&b.last_updated)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        if request.page.order == SortOrder::Desc {
            stats.reverse();
        }

        let total = stats.len();
        let threads = try_join_all(request.page.slice(stats).into_iter().map(|stats| async move {
            let first_message = self.preview(&stats).await?;
            Ok::<_, CheckpointError>(ThreadSummary {
                owner: owner_of(&stats.thread_id).map(str::to_string),
                first_message,
                last_updated: stats.last_updated,
                message_count: stats.checkpoint_count,
                config_id: config_id_of(&stats.thread_id)
                    .unwrap_or(UNKNOWN_CONFIG_ID)
                    .to_string(),
                thread_id: stats.thread_id,
            })
        }))
        .await?;

        debug!(owner = ?owner, total, returned = threads.len(), "Listed threads");
        Ok(ThreadListResponse {
            owner: owner.map(str::to_string),
            total,
            page: request.page.page,
            page_size: request.page.page_size,
            total_pages: request.page.total_pages(total),
            threads,
        })
    }

    async fn preview(&self, stats: &ThreadStats) -> Result<String> {
        let config = CheckpointConfig::for_thread(&stats.thread_id)
            .with_checkpoint_id(stats.latest_checkpoint_id.clone());
        match self.saver.get_tuple(&config).await {
            Ok(Some(latest)) => Ok(first_message_preview(latest.checkpoint.messages())),
            // Deleted since the stats were read
            Ok(None) => Ok(String::new()),
            Err(err) if err.is_serialization() => {
                warn!(
                    thread_id = %stats.thread_id,
                    checkpoint_id = %stats.latest_checkpoint_id,
                    error = %err,
                    "Latest checkpoint unreadable, listing thread without preview"
                );
                Ok(String::new())
            }
            Err(err) => Err(err),
        }
    }

    /// One page of a thread's checkpoint chain
    pub async fn history(&self, request: &HistoryRequest) -> Result<HistoryResponse> {
        request.page.validate()?;
        let config = CheckpointConfig::for_thread(&request.thread_id);
        config.require_thread_id()?;

        let mut tuples: Vec<CheckpointTuple> = self
            .saver
            .list(Some(&config), None, None, None)
            .await?
            .try_collect()
            .await?;
        if request.page.order == SortOrder::Asc {
            tuples.reverse();
        }

        let total = tuples.len();
        let checkpoints = request
            .page
            .slice(tuples)
            .into_iter()
            .map(|tuple| HistoryItem {
                checkpoint_id: tuple.checkpoint.id.clone(),
                parent_checkpoint_id: tuple.parent_checkpoint_id().map(str::to_string),
                messages: format_messages(tuple.checkpoint.messages()),
                metadata: tuple.metadata,
                created_at: tuple.created_at,
                updated_at: tuple.updated_at,
            })
            .collect::<Vec<_>>();

        debug!(thread_id = %request.thread_id, total, returned = checkpoints.len(), "Loaded history");
        Ok(HistoryResponse {
            thread_id: request.thread_id.clone(),
            total,
            page: request.page.page,
            page_size: request.page.page_size,
            total_pages: request.page.total_pages(total),
            checkpoints,
        })
    }

    /// One page of the latest checkpoint's de-duplicated messages
    pub async fn messages(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        request.page.validate()?;
        let config = CheckpointConfig::for_thread(&request.thread_id);
        config.require_thread_id()?;

        let config_id = request
            .config_id
            .clone()
            .filter(|config_id| !config_id.is_empty())
            .or_else(|| config_id_of(&request.thread_id).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_CONFIG_ID.to_string());

        let mut messages = match self.saver.get_tuple(&config).await? {
            Some(latest) => {
                let timestamp = Value::String(latest.created_at.to_rfc3339());
                let mut messages = format_messages(latest.checkpoint.messages());
                for message in &mut messages {
                    message.extra.insert("timestamp".to_string(), timestamp.clone());
                }
                messages
            }
            None => Vec::new(),
        };
        if request.page.order == SortOrder::Desc {
            messages.reverse();
        }

        let total = messages.len();
        let messages = request.page.slice(messages);

        debug!(thread_id = %request.thread_id, total, returned = messages.len(), "Loaded messages");
        Ok(MessagesResponse {
            thread_id: request.thread_id.clone(),
            total,
            page: request.page.page,
            page_size: request.page.page_size,
            total_pages: request.page.total_pages(total),
            config_id,
            messages,
        })
    }

    /// Delete a thread; `deleted` reports whether it had any checkpoint
    pub async fn delete_thread(&self, request: &DeleteThreadRequest) -> Result<DeleteThreadResponse> {
        let config = CheckpointConfig::for_thread(&request.thread_id);
        let thread_id = config.require_thread_id()?;

        // An undecodable latest checkpoint still counts as existing
        let existed = match self.saver.get_tuple(&config).await {
            Ok(found) => found.is_some(),
            Err(err) if err.is_serialization() => true,
            Err(err) => return Err(err),
        };
        self.saver.delete_thread(thread_id).await?;

        info!(thread_id = %thread_id, existed, "Deleted thread");
        Ok(DeleteThreadResponse { deleted: existed })
    }

    /// Summary of the latest (or the given) checkpoint of a thread
    pub async fn show(
        &self,
        thread_id: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<CheckpointSummary>> {
        let mut config = CheckpointConfig::for_thread(thread_id);
        config.require_thread_id()?;
        if let Some(checkpoint_id) = checkpoint_id {
            config = config.with_checkpoint_id(checkpoint_id);
        }

        Ok(self.saver.get_tuple(&config).await?.map(|tuple| {
            let mut channels: Vec<String> = tuple.checkpoint.channel_values.keys().cloned().collect();
            channels.sort();
            CheckpointSummary {
                thread_id: tuple.thread_id().to_string(),
                checkpoint_id: tuple.checkpoint.id.clone(),
                parent_checkpoint_id: tuple.parent_checkpoint_id().map(str::to_string),
                owner: owner_of(tuple.thread_id()).map(str::to_string),
                message_count: tuple.checkpoint.messages().len(),
                pending_writes: tuple.pending_writes.len(),
                channels,
                metadata: tuple.metadata,
                created_at: tuple.created_at,
                updated_at: tuple.updated_at,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PageRequest;
    use crate::checkpoint::{Checkpoint, CheckpointMetadata, MESSAGES_CHANNEL};
    use crate::error::CheckpointError;
    use crate::memory::InMemoryCheckpointSaver;
    use serde_json::json;
    use std::collections::HashMap;

    fn queries() -> ThreadQueries {
        ThreadQueries::new(Arc::new(InMemoryCheckpointSaver::new()))
    }

    async fn put_messages(q: &ThreadQueries, config: &CheckpointConfig, messages: Value) -> CheckpointConfig {
        q.saver()
            .put(
                config,
                Checkpoint::empty().with_channel_value(MESSAGES_CHANNEL, messages),
                CheckpointMetadata::new(),
                HashMap::new(),
            )
            .await
            .unwrap()
    }

    fn human(text: &str) -> Value {
        json!({"type": "human", "content": text})
    }

    fn ai(text: &str) -> Value {
        json!({"type": "ai", "content": text})
    }

    fn page(page: u32, page_size: u32, order: SortOrder) -> PageRequest {
        PageRequest::new(page, page_size, order)
    }

    #[tokio::test]
    async fn test_flattened_view_uses_latest_checkpoint_only() {
        let q = queries();
        let c1 = put_messages(&q, &CheckpointConfig::for_thread("a_1"), json!([human("H1"), ai("AI1")])).await;
        put_messages(&q, &c1, json!([human("H1"), ai("AI1"), human("H2"), ai("AI2")])).await;

        let response = q
            .messages(&MessagesRequest {
                thread_id: "a_1".to_string(),
                config_id: None,
                page: page(1, 20, SortOrder::Asc),
            })
            .await
            .unwrap();

        assert_eq!(response.total, 4);
        let contents: Vec<_> = response.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["H1", "AI1", "H2", "AI2"]);
        assert!(response.messages.iter().all(|m| m.extra.contains_key("timestamp")));
        assert_eq!(response.config_id, UNKNOWN_CONFIG_ID);

        let history = q
            .history(&HistoryRequest {
                thread_id: "a_1".to_string(),
                page: page(1, 20, SortOrder::Desc),
            })
            .await
            .unwrap();
        assert_eq!(history.total, 2);
        let per_checkpoint: usize = history.checkpoints.iter().map(|c| c.messages.len()).sum();
        assert_eq!(per_checkpoint, 6);
        assert_eq!(history.checkpoints[0].parent_checkpoint_id, c1.checkpoint_id);
    }

    #[tokio::test]
    async fn test_messages_desc_order_and_paging() {
        let q = queries();
        put_messages(
            &q,
            &CheckpointConfig::for_thread("bob_x_support"),
            json!([human("1"), ai("2"), human("3"), ai("4"), human("5")]),
        )
        .await;

        let response = q
            .messages(&MessagesRequest {
                thread_id: "bob_x_support".to_string(),
                config_id: None,
                page: page(2, 2, SortOrder::Desc),
            })
            .await
            .unwrap();

        assert_eq!(response.total, 5);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.config_id, "support");
        let contents: Vec<_> = response.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn test_unknown_thread_is_empty_success() {
        let q = queries();
        let response = q
            .messages(&MessagesRequest {
                thread_id: "ghost_1".to_string(),
                config_id: Some("cfg".to_string()),
                page: PageRequest::default(),
            })
            .await
            .unwrap();
        assert_eq!(response.total, 0);
        assert_eq!(response.total_pages, 0);
        assert_eq!(response.config_id, "cfg");

        let history = q
            .history(&HistoryRequest {
                thread_id: "ghost_1".to_string(),
                page: PageRequest::default(),
            })
            .await
            .unwrap();
        assert_eq!(history.total, 0);
        assert!(history.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn test_list_threads_by_owner() {
        let q = queries();
        put_messages(&q, &CheckpointConfig::for_thread("alice_1"), json!([human("first alice")])).await;
        put_messages(&q, &CheckpointConfig::for_thread("alice_2_travel"), json!([])).await;
        put_messages(&q, &CheckpointConfig::for_thread("bob_1"), json!([human("bob here")])).await;

        let alice = q
            .list_threads(&ListThreadsRequest {
                owner: Some("alice".to_string()),
                page: PageRequest::default(),
            })
            .await
            .unwrap();
        assert_eq!(alice.total, 2);
        assert_eq!(alice.owner.as_deref(), Some("alice"));
        assert!(alice.threads.iter().all(|t| t.owner.as_deref() == Some("alice")));

        let everyone = q.list_threads(&ListThreadsRequest::default()).await.unwrap();
        assert_eq!(everyone.total, 3);
        assert_eq!(everyone.owner, None);

        // Newest first by default
        assert_eq!(everyone.threads[0].thread_id, "bob_1");
        let travel = everyone
            .threads
            .iter()
            .find(|t| t.thread_id == "alice_2_travel")
            .unwrap();
        assert_eq!(travel.config_id, "travel");
        assert_eq!(travel.first_message, "");
    }

    #[tokio::test]
    async fn test_list_threads_groups_checkpoints() {
        let q = queries();
        let c1 = put_messages(&q, &CheckpointConfig::for_thread("carol_1"), json!([human("old")])).await;
        put_messages(&q, &c1, json!([human("old"), ai("reply")])).await;
        put_messages(&q, &CheckpointConfig::for_thread("dave_1"), json!([human("hey")])).await;

        let response = q
            .list_threads(&ListThreadsRequest {
                owner: None,
                page: page(1, 1, SortOrder::Asc),
            })
            .await
            .unwrap();

        assert_eq!(response.total, 2);
        assert_eq!(response.total_pages, 2);
        assert_eq!(response.threads.len(), 1);
        assert_eq!(response.threads[0].thread_id, "carol_1");
        assert_eq!(response.threads[0].message_count, 2);
        assert_eq!(response.threads[0].first_message, "old");
    }

    #[tokio::test]
    async fn test_history_pages_concatenate_to_full_list() {
        let q = queries();
        let mut config = CheckpointConfig::for_thread("erin_1");
        for i in 0..7 {
            config = put_messages(&q, &config, json!([human(&format!("m{}", i))])).await;
        }

        let full = q
            .history(&HistoryRequest {
                thread_id: "erin_1".to_string(),
                page: page(1, 100, SortOrder::Desc),
            })
            .await
            .unwrap();

        let mut paged = Vec::new();
        for p in 1..=3 {
            let response = q
                .history(&HistoryRequest {
                    thread_id: "erin_1".to_string(),
                    page: page(p, 3, SortOrder::Desc),
                })
                .await
                .unwrap();
            assert_eq!(response.total, 7);
            paged.extend(response.checkpoints);
        }
        assert_eq!(paged, full.checkpoints);

        let past_end = q
            .history(&HistoryRequest {
                thread_id: "erin_1".to_string(),
                page: page(4, 3, SortOrder::Desc),
            })
            .await
            .unwrap();
        assert!(past_end.checkpoints.is_empty());
        assert_eq!(past_end.total_pages, 3);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let q = queries();
        put_messages(&q, &CheckpointConfig::for_thread("frank_1"), json!([human("bye")])).await;

        let request = DeleteThreadRequest {
            thread_id: "frank_1".to_string(),
        };
        assert!(q.delete_thread(&request).await.unwrap().deleted);
        assert!(!q.delete_thread(&request).await.unwrap().deleted);
        assert!(q.show("frank_1", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let q = queries();
        let err = q
            .history(&HistoryRequest {
                thread_id: String::new(),
                page: PageRequest::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidReference(_)));

        let err = q
            .list_threads(&ListThreadsRequest {
                owner: None,
                page: page(1, 500, SortOrder::Desc),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_show_summary() {
        let q = queries();
        let c1 = put_messages(&q, &CheckpointConfig::for_thread("gina_1"), json!([human("a")])).await;
        let c2 = put_messages(&q, &c1, json!([human("a"), ai("b")])).await;
        q.saver()
            .put_writes(&c2, vec![("messages".to_string(), json!("pending"))], "task-1".to_string())
            .await
            .unwrap();

        let latest = q.show("gina_1", None).await.unwrap().unwrap();
        assert_eq!(Some(latest.checkpoint_id.clone()), c2.checkpoint_id);
        assert_eq!(latest.parent_checkpoint_id, c1.checkpoint_id);
        assert_eq!(latest.message_count, 2);
        assert_eq!(latest.pending_writes, 1);
        assert_eq!(latest.owner.as_deref(), Some("gina"));
        assert_eq!(latest.channels, vec!["messages".to_string()]);

        let first = q
            .show("gina_1", c1.checkpoint_id.as_deref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.message_count, 1);
    }
}
