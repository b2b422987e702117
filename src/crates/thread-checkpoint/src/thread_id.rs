//! Attributes derived from a thread identifier
//!
//! Thread ids follow the `owner_uuid_config` convention: segments joined by `_`,
//! the first naming the owner and, with three or more segments, the last naming
//! the configuration the conversation runs under.

/// Segment delimiter inside a thread id
pub const THREAD_ID_DELIMITER: char = '_';

/// Placeholder shown when a thread id carries no config segment
pub const UNKNOWN_CONFIG_ID: &str = "unknown";

/// Owner of a thread: its first segment, or `None` when that segment is empty
pub fn owner_of(thread_id: &str) -> Option<&str> {
    thread_id
        .split(THREAD_ID_DELIMITER)
        .next()
        .filter(|owner| !owner.is_empty())
}

/// Config id of a thread: its last segment when there are at least three
pub fn config_id_of(thread_id: &str) -> Option<&str> {
    let segments: Vec<&str> = thread_id.split(THREAD_ID_DELIMITER).collect();
    if segments.len() >= 3 {
        segments.last().copied().filter(|config| !config.is_empty())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_first_segment() {
        assert_eq!(owner_of("alice_1"), Some("alice"));
        assert_eq!(owner_of("alice_3f9c_support"), Some("alice"));
        assert_eq!(owner_of("bob"), Some("bob"));
        assert_eq!(owner_of("_orphan"), None);
        assert_eq!(owner_of(""), None);
    }

    #[test]
    fn test_config_id_needs_three_segments() {
        assert_eq!(config_id_of("alice_3f9c_support"), Some("support"));
        assert_eq!(config_id_of("alice_3f9c_x_support"), Some("support"));
        assert_eq!(config_id_of("alice_1"), None);
        assert_eq!(config_id_of("alice_1_"), None);
    }
}
