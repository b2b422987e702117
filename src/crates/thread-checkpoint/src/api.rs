//! Request and response shapes exposed to the transport layer
//!
//! All shapes serialize in camelCase. Requests are validated with
//! [`PageRequest::validate`] before any backend access; store errors are
//! converted into [`ApiError`] with a stable code at the boundary.

use crate::checkpoint::CheckpointMetadata;
use crate::error::{CheckpointError, Result};
use crate::messages::FormattedMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Page size used when a request does not name one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort direction of a paginated view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(CheckpointError::InvalidRequest(format!(
                "order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Offset pagination parameters shared by every listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            order: SortOrder::default(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32, order: SortOrder) -> Self {
        Self {
            page,
            page_size,
            order,
        }
    }

    /// Reject a page below 1 or a page size outside `1..=100`
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(CheckpointError::InvalidRequest(
                "page must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(CheckpointError::InvalidRequest(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Number of items before this page
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }

    /// `ceil(total / pageSize)`, or 0 when there is nothing to page
    pub fn total_pages(&self, total: usize) -> u32 {
        if total == 0 || self.page_size == 0 {
            return 0;
        }
        total.div_ceil(self.page_size as usize) as u32
    }

    /// The items of this page; empty past the end
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .collect()
    }
}

/// List threads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListThreadsRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// Checkpoint-chain history of one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub thread_id: String,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// Flattened messages of one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRequest {
    pub thread_id: String,
    #[serde(default)]
    pub config_id: Option<String>,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// Delete one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteThreadRequest {
    pub thread_id: String,
}

/// One row of the thread listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub thread_id: String,
    pub owner: Option<String>,
    pub first_message: String,
    pub last_updated: DateTime<Utc>,
    /// Number of checkpoints stored for the thread
    pub message_count: usize,
    pub config_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListResponse {
    pub owner: Option<String>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub threads: Vec<ThreadSummary>,
}

/// One checkpoint of the history view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub messages: Vec<FormattedMessage>,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub thread_id: String,
    /// Number of checkpoints in the thread
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub checkpoints: Vec<HistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub thread_id: String,
    /// Number of messages after de-duplication
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub config_id: String,
    pub messages: Vec<FormattedMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteThreadResponse {
    pub deleted: bool,
}

/// Summary of one checkpoint, for inspection tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub owner: Option<String>,
    pub metadata: CheckpointMetadata,
    pub channels: Vec<String>,
    pub message_count: usize,
    pub pending_writes: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API error response structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for programmatic handling
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Store error as seen by the transport layer
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CheckpointError);

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match &self.0 {
            CheckpointError::InvalidReference(_) => 400,
            CheckpointError::InvalidRequest(_) => 422,
            CheckpointError::BackendUnavailable(_) => 503,
            CheckpointError::Serialization { .. }
            | CheckpointError::Codec(_)
            | CheckpointError::Storage(_)
            | CheckpointError::Config(_)
            | CheckpointError::Io(_) => 500,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match &self.0 {
            CheckpointError::InvalidReference(_) => "INVALID_REFERENCE",
            CheckpointError::InvalidRequest(_) => "VALIDATION_ERROR",
            CheckpointError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            CheckpointError::Serialization { .. } | CheckpointError::Codec(_) => {
                "SERIALIZATION_FAILURE"
            }
            CheckpointError::Storage(_) | CheckpointError::Config(_) | CheckpointError::Io(_) => {
                "STORAGE_ERROR"
            }
        }
    }

    /// Error type name
    pub fn error_type(&self) -> &'static str {
        match &self.0 {
            CheckpointError::InvalidReference(_) => "InvalidReference",
            CheckpointError::InvalidRequest(_) => "ValidationError",
            CheckpointError::BackendUnavailable(_) => "BackendUnavailable",
            CheckpointError::Serialization { .. } | CheckpointError::Codec(_) => {
                "SerializationFailure"
            }
            CheckpointError::Storage(_) | CheckpointError::Config(_) | CheckpointError::Io(_) => {
                "StorageError"
            }
        }
    }

    /// Body sent to the client
    pub fn to_response(&self) -> ApiErrorResponse {
        ApiErrorResponse::new(self.error_type(), self.to_string(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_defaults() {
        let request: ListThreadsRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.owner, None);
        assert_eq!(request.page, PageRequest::default());
        assert_eq!(request.page.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(request.page.order, SortOrder::Desc);
    }

    #[test]
    fn test_camel_case_request() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "threadId": "alice_1_cfg",
            "configId": "cfg",
            "page": 2,
            "pageSize": 5,
            "order": "asc"
        }))
        .unwrap();
        assert_eq!(request.thread_id, "alice_1_cfg");
        assert_eq!(request.page, PageRequest::new(2, 5, SortOrder::Asc));
    }

    #[test]
    fn test_validation_bounds() {
        assert!(PageRequest::new(1, 1, SortOrder::Asc).validate().is_ok());
        assert!(PageRequest::new(1, 100, SortOrder::Asc).validate().is_ok());
        assert!(PageRequest::new(0, 20, SortOrder::Asc).validate().is_err());
        assert!(PageRequest::new(1, 0, SortOrder::Asc).validate().is_err());
        assert!(PageRequest::new(1, 101, SortOrder::Asc).validate().is_err());
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_total_pages_and_slice() {
        let page = PageRequest::new(2, 3, SortOrder::Desc);
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(3), 1);
        assert_eq!(page.total_pages(7), 3);
        assert_eq!(page.slice((0..7).collect()), vec![3, 4, 5]);
        assert!(PageRequest::new(9, 3, SortOrder::Desc)
            .slice((0..7).collect::<Vec<_>>())
            .is_empty());
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (CheckpointError::InvalidReference("".into()), 400, "INVALID_REFERENCE"),
            (CheckpointError::InvalidRequest("".into()), 422, "VALIDATION_ERROR"),
            (CheckpointError::BackendUnavailable("".into()), 503, "BACKEND_UNAVAILABLE"),
            (CheckpointError::serialization("t", "c", "x"), 500, "SERIALIZATION_FAILURE"),
            (CheckpointError::Storage("".into()), 500, "STORAGE_ERROR"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.code(), code);
            assert_eq!(api.to_response().code, code);
        }
    }
}
