//! Typing indicator coordination

use std::collections::HashSet;

use parley_proto::OutboundEvent;

use crate::connection::ConnectionManager;

/// Translates local input activity into edge-triggered typing frames and
/// remote typing frames into a displayable flag.
#[derive(Debug, Default)]
pub struct TypingCoordinator {
    /// Our own participant id; remote frames carrying it are echoes
    local_participant: Option<String>,
    /// Last value that actually reached the wire
    last_sent: bool,
    /// Remote participants currently typing
    typing: HashSet<String>,
}

impl TypingCoordinator {
    pub fn new(local_participant: Option<String>) -> Self {
        Self {
            local_participant,
            ..Self::default()
        }
    }

    /// Report whether the local input box has content.
    ///
    /// Sends only on a change from the last value sent. Returns whether a
    /// frame went out.
    pub fn notify_local_activity(&mut self, has_content: bool, connection: &ConnectionManager) -> bool {
        if has_content == self.last_sent {
            return false;
        }

        let sent = connection.send(&OutboundEvent::TypingIndicator {
            is_typing: has_content,
        });
        if sent {
            self.last_sent = has_content;
        }
        sent
    }

    /// Record a remote typing frame. Returns whether the displayed flag changed.
    pub fn on_remote_typing_state(&mut self, participant: &str, is_typing: bool) -> bool {
        if self.local_participant.as_deref() == Some(participant) {
            return false;
        }

        let before = self.is_remote_typing();
        if is_typing {
            self.typing.insert(participant.to_string());
        } else {
            self.typing.remove(participant);
        }
        before != self.is_remote_typing()
    }

    /// Whether any remote participant is typing
    pub fn is_remote_typing(&self) -> bool {
        !self.typing.is_empty()
    }

    /// Forget remote state, e.g. after the channel was lost
    pub fn clear_remote(&mut self) {
        self.typing.clear();
    }

    /// Forget what was last sent so the next local edge is re-announced on a
    /// fresh connection
    pub fn reset_local(&mut self) {
        self.last_sent = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ReconnectPolicy, testing::MockConnector};
    use std::sync::Arc;

    #[test]
    fn test_remote_single_party() {
        let mut typing = TypingCoordinator::new(None);
        assert!(typing.on_remote_typing_state("u2", true));
        assert!(typing.is_remote_typing());
        assert!(!typing.on_remote_typing_state("u2", true));
        assert!(typing.on_remote_typing_state("u2", false));
        assert!(!typing.is_remote_typing());
    }

    #[test]
    fn test_remote_false_from_one_of_many_is_not_global() {
        let mut typing = TypingCoordinator::new(None);
        typing.on_remote_typing_state("u2", true);
        typing.on_remote_typing_state("u3", true);

        assert!(!typing.on_remote_typing_state("u2", false));
        assert!(typing.is_remote_typing());

        typing.on_remote_typing_state("u3", false);
        assert!(!typing.is_remote_typing());
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut typing = TypingCoordinator::new(Some("u1".to_string()));
        assert!(!typing.on_remote_typing_state("u1", true));
        assert!(!typing.is_remote_typing());
    }

    #[test]
    fn test_clear_remote() {
        let mut typing = TypingCoordinator::new(None);
        typing.on_remote_typing_state("u2", true);
        typing.clear_remote();
        assert!(!typing.is_remote_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_activity_is_edge_triggered() {
        let (connector, mut servers) = MockConnector::new(true);
        let mut conn =
            ConnectionManager::new("ws://chat.test", ReconnectPolicy::default(), connector);
        conn.connect("c1").unwrap();
        let mut server = servers.recv().await.unwrap();
        conn.watch_status().wait_for(|s| s.is_open()).await.unwrap();

        let mut typing = TypingCoordinator::new(None);
        assert!(!typing.notify_local_activity(false, &conn));
        assert!(typing.notify_local_activity(true, &conn));
        assert!(!typing.notify_local_activity(true, &conn));
        assert!(!typing.notify_local_activity(true, &conn));
        assert!(typing.notify_local_activity(false, &conn));

        assert_eq!(
            server.next_sent().await.unwrap(),
            serde_json::json!({"type": "typing_indicator", "is_typing": true})
        );
        assert_eq!(
            server.next_sent().await.unwrap(),
            serde_json::json!({"type": "typing_indicator", "is_typing": false})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_send_is_retried_on_next_call() {
        let (connector, mut servers) = MockConnector::new(true);
        let mut conn =
            ConnectionManager::new("ws://chat.test", ReconnectPolicy::default(), connector);

        let mut typing = TypingCoordinator::new(None);
        assert!(!typing.notify_local_activity(true, &conn));

        conn.connect("c1").unwrap();
        let mut server = servers.recv().await.unwrap();
        conn.watch_status().wait_for(|s| s.is_open()).await.unwrap();

        assert!(typing.notify_local_activity(true, &conn));
        assert_eq!(
            server.next_sent().await.unwrap(),
            serde_json::json!({"type": "typing_indicator", "is_typing": true})
        );
    }
}
