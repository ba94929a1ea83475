use serde_json::Value;
use switchyard_core::{LedgerSnapshot, Message, MessageType};

/// Assertion helpers for message-level checks
pub struct TestAssertions;

impl TestAssertions {
    /// Assert that `reply` answers `original` and is addressed back to its sender
    pub fn is_reply_to(reply: &Message, original: &Message) {
        assert_eq!(
            reply.in_reply_to(),
            Some(original.id()),
            "Reply {} should correlate with message {}",
            reply.id(),
            original.id()
        );
        assert_eq!(
            reply.recipient_id(),
            Some(original.sender_id()),
            "Reply {} should be addressed to {}",
            reply.id(),
            original.sender_id()
        );
    }

    /// Assert that `reply` is the coordinator's acknowledgment of `alert`
    pub fn is_acknowledgment(reply: &Message, alert: &Message) {
        Self::is_reply_to(reply, alert);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(
            reply.content_str("status"),
            Some("acknowledged"),
            "Expected acknowledgment, got {:?}",
            reply.content()
        );
    }

    /// Assert that `reply` is an error RESPONSE carrying `error`
    pub fn is_error_response(reply: &Message, error: &str) {
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(
            reply.content().get("error"),
            Some(&Value::from(error)),
            "Expected error {:?}, got {:?}",
            error,
            reply.content()
        );
    }

    /// Assert that the ledger records `status` for `task_id`
    pub fn task_has_status(ledger: &LedgerSnapshot, task_id: &str, status: &str) {
        let record = ledger
            .tasks
            .get(task_id)
            .unwrap_or_else(|| panic!("Task {task_id} missing from ledger"));
        assert_eq!(record.status, status, "Task {task_id} has unexpected status");
    }

    /// Assert that exactly `expected` messages were delivered to each inbox
    pub fn delivered_counts(received: &[(&str, usize)], expected: usize) {
        for (agent_id, count) in received {
            assert_eq!(
                *count, expected,
                "Agent {agent_id} received {count} messages, expected {expected}"
            );
        }
    }
}
