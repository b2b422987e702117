//! Core checkpoint data structures for conversation-state persistence
//!
//! This module defines the fundamental data types of the store: **[`Checkpoint`]**,
//! **[`CheckpointConfig`]**, **[`CheckpointMetadata`]**, and **[`CheckpointTuple`]**.
//! A checkpoint is an immutable point-in-time snapshot of an execution's state,
//! indexed by a logical thread identifier.
//!
//! # Overview
//!
//! - **State Snapshots** - Channel values captured after each execution step
//! - **Thread Isolation** - Independent checkpoint histories per `thread_id`
//! - **Parent Linkage** - Each checkpoint may point back at the one it resumed from
//! - **Time-Ordered IDs** - [`next_checkpoint_id`] yields fixed-width ids whose
//!   lexicographic order is their creation order, so "latest" survives restarts
//! - **Serializable** - All types round-trip through serde
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  CheckpointTuple                             │
//! │  ┌────────────────────────────────────────┐  │
//! │  │  CheckpointConfig (the reference)      │  │
//! │  │  • thread_id: "alice_8f2c_ops"         │  │
//! │  │  • checkpoint_id: "00061f..-9ab3.."    │  │
//! │  └────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────┐  │
//! │  │  Checkpoint (the state value)          │  │
//! │  │  • channel_values: {"messages": [..]}  │  │
//! │  │  • channel_versions / versions_seen    │  │
//! │  └────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────┐  │
//! │  │  CheckpointMetadata                    │  │
//! │  │  • source: loop, step: 3, writes: {..} │  │
//! │  └────────────────────────────────────────┘  │
//! │  parent_config, pending_writes,              │
//! │  created_at, updated_at                      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use thread_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource};
//! use serde_json::json;
//!
//! let checkpoint = Checkpoint::empty()
//!     .with_channel_value("messages", json!([{"type": "human", "content": "hi"}]));
//!
//! let metadata = CheckpointMetadata::new()
//!     .with_source(CheckpointSource::Loop)
//!     .with_step(0);
//!
//! let config = CheckpointConfig::new().with_thread_id("alice_1");
//! assert_eq!(config.require_thread_id().unwrap(), "alice_1");
//! assert_eq!(checkpoint.messages().len(), 1);
//! # let _ = metadata;
//! ```

use crate::error::{CheckpointError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Pending write tuple: (task_id, channel, value)
pub type PendingWrite = (String, String, serde_json::Value);

/// Channel name holding the conversation's message list
pub const MESSAGES_CHANNEL: &str = "messages";

static LAST_ID_TICK: AtomicU64 = AtomicU64::new(0);

/// Generate a new checkpoint id
///
/// Ids are a 16-digit hex microsecond tick followed by a random suffix. The tick
/// never repeats or goes backwards within a process, so ids sort in creation order.
pub fn next_checkpoint_id() -> CheckpointId {
    let now = Utc::now().timestamp_micros().max(0) as u64;
    let mut last = LAST_ID_TICK.load(Ordering::Relaxed);
    let tick = loop {
        let candidate = now.max(last + 1);
        match LAST_ID_TICK.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => break candidate,
            Err(actual) => last = actual,
        }
    };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{:016x}-{}", tick, &suffix[..12])
}

/// Channel version type - can be int, float, or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

/// Mapping from channel name to version
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// Metadata source type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from an input to the execution
    Input,
    /// Checkpoint created from inside the execution loop
    Loop,
    /// Checkpoint created from a manual state update
    Update,
    /// Checkpoint created as a copy of another checkpoint
    Fork,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Writes produced by the step, keyed by node (pending-write markers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<serde_json::Value>,

    /// Mapping from checkpoint namespace to parent checkpoint ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<HashMap<String, String>>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the step's writes
    pub fn with_writes(mut self, writes: serde_json::Value) -> Self {
        self.writes = Some(writes);
        self
    }

    /// Set parent checkpoints
    pub fn with_parents(mut self, parents: HashMap<String, String>) -> Self {
        self.parents = Some(parents);
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Check that every filter entry equals the same top-level field of this metadata
    ///
    /// Both named fields (`source`, `step`, ...) and extra fields can be matched.
    /// An empty filter matches everything.
    pub fn matches(&self, filter: &HashMap<String, serde_json::Value>) -> bool {
        if filter.is_empty() {
            return true;
        }
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return false;
        };
        filter
            .iter()
            .all(|(key, expected)| fields.get(key) == Some(expected))
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// The ID of the checkpoint (unique and monotonically increasing within a thread).
    /// Left empty, the store assigns one on `put`.
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// Mapping from channel name to channel value
    pub channel_values: HashMap<String, serde_json::Value>,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Map from node ID to map from channel name to version seen
    pub versions_seen: HashMap<String, ChannelVersions>,

    /// The channels that were updated in this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_channels: Option<Vec<String>>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint
    pub fn new(
        id: CheckpointId,
        channel_values: HashMap<String, serde_json::Value>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
            channel_versions,
            versions_seen,
            updated_channels: None,
        }
    }

    /// Create an empty checkpoint with a freshly generated id
    pub fn empty() -> Self {
        Self::new(
            next_checkpoint_id(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    /// Set a channel value
    pub fn with_channel_value(mut self, channel: impl Into<String>, value: serde_json::Value) -> Self {
        self.channel_values.insert(channel.into(), value);
        self
    }

    /// Set the updated channels
    pub fn with_updated_channels(mut self, channels: Vec<String>) -> Self {
        self.updated_channels = Some(channels);
        self
    }

    /// Messages embedded in this snapshot (empty when the channel is absent or not a list)
    pub fn messages(&self) -> &[serde_json::Value] {
        self.channel_values
            .get(MESSAGES_CHANNEL)
            .and_then(|value| value.as_array())
            .map(|messages| messages.as_slice())
            .unwrap_or(&[])
    }
}

/// Configuration for checkpoint operations, also used as a checkpoint reference
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointConfig {
    /// Thread ID for grouping related checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Specific checkpoint ID to retrieve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Additional configuration
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointConfig {
    /// Create a new checkpoint configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference to the latest checkpoint of a thread
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new().with_thread_id(thread_id)
    }

    /// Set the thread ID
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// The thread ID, rejecting missing or blank values
    pub fn require_thread_id(&self) -> Result<&str> {
        match self.thread_id.as_deref() {
            Some(thread_id) if !thread_id.trim().is_empty() => Ok(thread_id),
            _ => Err(CheckpointError::InvalidReference(
                "thread_id is required".to_string(),
            )),
        }
    }

    /// The checkpoint ID, rejecting missing or blank values
    pub fn require_checkpoint_id(&self) -> Result<&str> {
        match self.checkpoint_id.as_deref() {
            Some(checkpoint_id) if !checkpoint_id.trim().is_empty() => Ok(checkpoint_id),
            _ => Err(CheckpointError::InvalidReference(
                "checkpoint_id is required".to_string(),
            )),
        }
    }
}

/// Per-thread aggregate read without decoding any checkpoint state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStats {
    pub thread_id: String,

    /// Greatest checkpoint id in the thread
    pub latest_checkpoint_id: CheckpointId,

    pub checkpoint_count: usize,

    /// Most recent `updated_at` over the thread's checkpoints
    pub last_updated: DateTime<Utc>,
}

/// A checkpoint together with everything stored alongside it
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Reference that re-fetches exactly this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,

    /// Parent reference (if any)
    pub parent_config: Option<CheckpointConfig>,

    /// Pending writes recorded against this checkpoint
    pub pending_writes: Vec<PendingWrite>,

    /// First time this checkpoint was written
    pub created_at: DateTime<Utc>,

    /// Last time this checkpoint was (re)written
    pub updated_at: DateTime<Utc>,
}

impl CheckpointTuple {
    /// Create a new checkpoint tuple
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        let ts = checkpoint.ts;
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    /// Set the pending writes
    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }

    /// Set the write timestamps
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Thread this checkpoint belongs to
    pub fn thread_id(&self) -> &str {
        self.config.thread_id.as_deref().unwrap_or_default()
    }

    /// ID of this checkpoint
    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint.id
    }

    /// ID of the parent checkpoint, if any
    pub fn parent_checkpoint_id(&self) -> Option<&str> {
        self.parent_config
            .as_ref()
            .and_then(|parent| parent.checkpoint_id.as_deref())
    }
}
