//! # thread-checkpoint - Conversation State Persistence
//!
//! **Checkpoint store contract, in-memory backend and read models** for long-running,
//! branching conversations. The execution engine stores a snapshot after every step
//! and resumes from the latest one; history UIs browse the same snapshots through the
//! query layer.
//!
//! ## Overview
//!
//! - **Upsert writes** - `put` is keyed by `(thread_id, checkpoint_id)`, so retries are safe
//! - **Deterministic order** - time-ordered checkpoint ids survive process restarts
//! - **Stable pagination** - `list` takes a strict `before` cursor
//! - **Clean deletion** - `delete_thread` leaves nothing readable behind
//! - **Backend agnostic** - every backend passes the same [`conformance`] suite
//!
//! ## Core Concepts
//!
//! ### 1. CheckpointSaver Trait
//!
//! The [`CheckpointSaver`] trait is the storage contract:
//!
//! - **`put()`** - Save a checkpoint, linking it to the one it was derived from
//! - **`get_tuple()`** - Latest or exact checkpoint with metadata and pending writes
//! - **`list()`** - Newest-first history with metadata filter, cursor and limit
//! - **`put_writes()`** - Intermediate writes of a task
//! - **`delete_thread()`** - Remove a whole thread
//!
//! ### 2. Query Layer
//!
//! [`ThreadQueries`] serves the transport-facing views: thread listing per owner,
//! checkpoint-chain history, and the flattened, de-duplicated message list.
//!
//! ### 3. Backends
//!
//! This crate ships [`InMemoryCheckpointSaver`]. The durable SQLite backend lives in
//! the `thread-checkpoint-sqlite` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use thread_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
//!     InMemoryCheckpointSaver, MessagesRequest, PageRequest, ThreadQueries,
//! };
//! use serde_json::json;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> thread_checkpoint::Result<()> {
//!     let saver = Arc::new(InMemoryCheckpointSaver::new());
//!
//!     let checkpoint = Checkpoint::empty().with_channel_value(
//!         "messages",
//!         json!([{"type": "human", "content": "Hi"}, {"type": "ai", "content": "Hello!"}]),
//!     );
//!     saver
//!         .put(&CheckpointConfig::for_thread("alice_1"), checkpoint, CheckpointMetadata::new(), HashMap::new())
//!         .await?;
//!
//!     let queries = ThreadQueries::new(saver);
//!     let page = queries
//!         .messages(&MessagesRequest {
//!             thread_id: "alice_1".to_string(),
//!             config_id: None,
//!             page: PageRequest::default(),
//!         })
//!         .await?;
//!     assert_eq!(page.total, 2);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod checkpoint;
pub mod conformance;
pub mod error;
pub mod memory;
pub mod messages;
pub mod query;
pub mod serializer;
pub mod thread_id;
pub mod traits;

// Re-export main types
pub use api::{
    ApiError, ApiErrorResponse, CheckpointSummary, DeleteThreadRequest, DeleteThreadResponse,
    HistoryItem, HistoryRequest, HistoryResponse, ListThreadsRequest, MessagesRequest,
    MessagesResponse, PageRequest, SortOrder, ThreadListResponse, ThreadSummary,
};
pub use checkpoint::{
    next_checkpoint_id, ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig,
    CheckpointId, CheckpointMetadata, CheckpointSource, CheckpointTuple, PendingWrite,
    ThreadStats, MESSAGES_CHANNEL,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use messages::{format_messages, FormattedMessage, Role};
pub use query::ThreadQueries;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use thread_id::{config_id_of, owner_of};
pub use traits::{CheckpointSaver, CheckpointStream};
