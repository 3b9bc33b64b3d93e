//! Notification requests, one JSON object per input line

use contracts::{GroupKey, Priority, RecipientId};
use dispatcher::{join_events, DispatchError, DispatcherHandle};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CliError;

/// A single line of input
///
/// ```text
/// {"recipient":"chat-1","payload":"Server down","priority":"critical"}
/// {"recipient":"chat-1","group":"joins","event":"alice","priority":"low"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NotificationRequest {
    /// Buffered and merged with other events of the same group
    Mergeable {
        recipient: RecipientId,
        group: GroupKey,
        event: Value,
        #[serde(default)]
        priority: Priority,
    },
    Direct {
        recipient: RecipientId,
        payload: String,
        #[serde(default)]
        priority: Priority,
    },
}

impl NotificationRequest {
    /// Parse one line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str, line_no: usize) -> Result<Option<Self>, CliError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| CliError::invalid_request(line_no, e.to_string()))
    }

    pub fn priority(&self) -> Priority {
        match self {
            Self::Mergeable { priority, .. } | Self::Direct { priority, .. } => *priority,
        }
    }

    /// Hand the request to the dispatcher
    pub fn submit(self, handle: &DispatcherHandle) -> Result<(), DispatchError> {
        match self {
            Self::Direct {
                recipient,
                payload,
                priority,
            } => handle.submit(recipient, payload, priority),
            Self::Mergeable {
                recipient,
                group,
                event,
                priority,
            } => {
                let merge_fn = join_events(format!("{group}: "));
                handle.enqueue_mergeable(recipient, group, event, merge_fn, priority)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct() {
        let line = r#"{"recipient":"chat-1","payload":"Server down","priority":"critical"}"#;
        let request = NotificationRequest::parse(line, 1).unwrap().unwrap();

        assert_eq!(request.priority(), Priority::Critical);
        assert!(matches!(
            request,
            NotificationRequest::Direct { ref payload, .. } if payload == "Server down"
        ));
    }

    #[test]
    fn test_parse_mergeable_default_priority() {
        let line = r#"{"recipient":"chat-1","group":"joins","event":"alice"}"#;
        let request = NotificationRequest::parse(line, 1).unwrap().unwrap();

        assert_eq!(request.priority(), Priority::Normal);
        assert!(matches!(request, NotificationRequest::Mergeable { .. }));
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert!(NotificationRequest::parse("   ", 1).unwrap().is_none());
        assert!(NotificationRequest::parse("# header", 2).unwrap().is_none());
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = NotificationRequest::parse(r#"{"recipient":"chat-1"}"#, 7).unwrap_err();
        assert!(matches!(err, CliError::InvalidRequest { line: 7, .. }));
    }
}
