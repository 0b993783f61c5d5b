//! Client-side message log and the reducer that applies wire events to it

use chrono::{DateTime, Utc};
use parley_proto::{Message, MessageId, Sender, TempId};

/// What a reducer operation did to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChange {
    /// A new entry was pushed at this index
    Appended(usize),
    /// The entry at this index was modified in place
    Updated(usize),
    /// Nothing matched; the log is untouched
    Unchanged,
}

/// Ordered, append-only log of the messages in one conversation view.
///
/// Entries are never removed or reordered. At most one assistant message is
/// open (not finalized) at a time and `active_stream` points at it.
#[derive(Debug)]
pub struct MessageLog {
    messages: Vec<Message>,
    active_stream: Option<usize>,
    /// Random per-log prefix so temporary ids never collide across sessions
    session_tag: String,
    next_seq: u64,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        Self {
            messages: Vec::new(),
            active_stream: None,
            session_tag: tag[..8].to_string(),
            next_seq: 0,
        }
    }

    /// Read-only snapshot of the log
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether an assistant reply is currently streaming
    pub fn is_streaming(&self) -> bool {
        self.active_stream.is_some()
    }

    /// The assistant message currently receiving tokens
    pub fn active_stream(&self) -> Option<&Message> {
        self.active_stream.map(|i| &self.messages[i])
    }

    fn next_temp_id(&mut self) -> TempId {
        self.next_seq += 1;
        TempId::new(format!("temp-{}-{}", self.session_tag, self.next_seq))
    }

    /// Append an optimistic user message and return its temporary id.
    ///
    /// Never waits for the network; the caller hands the id to the wire.
    pub fn submit_user_message(&mut self, content: impl Into<String>) -> (TempId, LogChange) {
        let temp_id = self.next_temp_id();
        self.messages.push(Message::user(temp_id.clone(), content));
        (temp_id, LogChange::Appended(self.messages.len() - 1))
    }

    /// Swap a user message's temporary id for the server's id and timestamp.
    ///
    /// Without a server timestamp the local submit time is kept.
    pub fn apply_ack(
        &mut self,
        temp_id: &TempId,
        server_id: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> LogChange {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.sender == Sender::User && m.id.as_temp() == Some(temp_id))
        else {
            tracing::debug!("Ignoring ack for unknown temporary id {}", temp_id);
            return LogChange::Unchanged;
        };

        let message = &mut self.messages[index];
        message.id = MessageId::server(server_id);
        match timestamp {
            Some(ts) => message.timestamp = ts,
            None => tracing::debug!("Ack for {} carried no usable timestamp", temp_id),
        }
        LogChange::Updated(index)
    }

    /// Append a streamed token to the open assistant reply, opening one if
    /// none is in progress
    pub fn apply_token_chunk(&mut self, token: &str) -> LogChange {
        if let Some(index) = self.active_stream {
            self.messages[index].content.push_str(token);
            return LogChange::Updated(index);
        }

        let temp_id = self.next_temp_id();
        self.messages
            .push(Message::assistant_streaming(temp_id, token));
        let index = self.messages.len() - 1;
        self.active_stream = Some(index);
        LogChange::Appended(index)
    }

    /// Seal the open assistant reply with the authoritative text and id
    pub fn apply_stream_done(&mut self, server_id: impl Into<String>, full_text: String) -> LogChange {
        let Some(index) = self.active_stream.take() else {
            tracing::debug!("Ignoring stream completion without an open reply");
            return LogChange::Unchanged;
        };

        let message = &mut self.messages[index];
        debug_assert_eq!(message.sender, Sender::Assistant);
        if message.content != full_text {
            tracing::debug!(
                "Streamed text differed from final text ({} vs {} bytes)",
                message.content.len(),
                full_text.len()
            );
        }
        message.content = full_text;
        message.id = MessageId::server(server_id);
        message.finalized = true;
        LogChange::Updated(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn open_assistant_count(log: &MessageLog) -> usize {
        log.messages().iter().filter(|m| m.is_streaming()).count()
    }

    #[test]
    fn test_tokens_concatenate_into_single_trailing_message() {
        let mut log = MessageLog::new();
        log.submit_user_message("hi");

        let tokens = ["The", " quick", " brown", " fox"];
        for token in tokens {
            log.apply_token_chunk(token);
        }

        assert_eq!(log.len(), 2);
        let last = log.last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert_eq!(last.content, tokens.concat());
        assert!(!last.finalized);
        assert!(log.is_streaming());
    }

    #[test]
    fn test_first_token_appends_and_later_tokens_update() {
        let mut log = MessageLog::new();
        assert_eq!(log.apply_token_chunk("a"), LogChange::Appended(0));
        assert_eq!(log.apply_token_chunk("b"), LogChange::Updated(0));
    }

    #[test]
    fn test_stream_done_replaces_content_and_finalizes() {
        let mut log = MessageLog::new();
        log.apply_token_chunk("He");
        log.apply_token_chunk("llo");
        let change = log.apply_stream_done("m2", "Hello there".to_string());

        assert_eq!(change, LogChange::Updated(0));
        assert_eq!(log.len(), 1);
        let msg = log.last().unwrap();
        assert_eq!(msg.id, MessageId::server("m2"));
        assert_eq!(msg.content, "Hello there");
        assert!(msg.finalized);
        assert!(!log.is_streaming());
    }

    #[test]
    fn test_stream_done_without_open_reply_is_noop() {
        let mut log = MessageLog::new();
        log.submit_user_message("hello");
        let before = log.messages().to_vec();

        assert_eq!(log.apply_stream_done("m9", "orphan".to_string()), LogChange::Unchanged);
        assert_eq!(log.messages(), before.as_slice());
    }

    #[test]
    fn test_token_after_done_opens_new_reply() {
        let mut log = MessageLog::new();
        log.apply_token_chunk("one");
        log.apply_stream_done("m1", "one".to_string());
        assert_eq!(log.apply_token_chunk("two"), LogChange::Appended(1));

        assert_eq!(log.len(), 2);
        assert_eq!(open_assistant_count(&log), 1);
        assert_eq!(log.messages()[0].content, "one");
        assert_eq!(log.messages()[1].content, "two");
    }

    #[test]
    fn test_user_message_mid_stream_keeps_single_open_reply() {
        let mut log = MessageLog::new();
        log.apply_token_chunk("Hel");
        log.submit_user_message("wait");
        log.apply_token_chunk("lo");

        assert_eq!(log.len(), 2);
        assert_eq!(open_assistant_count(&log), 1);
        assert_eq!(log.messages()[0].content, "Hello");
        assert_eq!(log.messages()[1].content, "wait");

        log.apply_stream_done("m1", "Hello".to_string());
        assert_eq!(open_assistant_count(&log), 0);
        assert_eq!(log.messages()[0].id, MessageId::server("m1"));
    }

    #[test]
    fn test_temp_ids_never_collide() {
        let mut log = MessageLog::new();
        let mut other = MessageLog::new();
        let mut seen = HashSet::new();
        for i in 0..500 {
            let (id, _) = log.submit_user_message(format!("m{}", i));
            assert!(seen.insert(id));
            let (id, _) = other.submit_user_message(format!("m{}", i));
            assert!(seen.insert(id));
        }
        // Assistant placeholders draw from the same sequence
        log.apply_token_chunk("x");
        let placeholder = log.last().unwrap().id.as_temp().cloned().unwrap();
        assert!(seen.insert(placeholder));
    }

    #[test]
    fn test_ack_replaces_id_and_timestamp() {
        let mut log = MessageLog::new();
        let (temp_id, _) = log.submit_user_message("hello");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(log.apply_ack(&temp_id, "m1", Some(ts)), LogChange::Updated(0));

        let msg = &log.messages()[0];
        assert_eq!(msg.id, MessageId::server("m1"));
        assert_eq!(msg.timestamp, ts);
        assert_eq!(msg.content, "hello");
        assert!(msg.is_acknowledged());
    }

    #[test]
    fn test_ack_without_timestamp_keeps_local_time() {
        let mut log = MessageLog::new();
        let (temp_id, _) = log.submit_user_message("hello");
        let local = log.messages()[0].timestamp;

        assert_eq!(log.apply_ack(&temp_id, "m1", None), LogChange::Updated(0));
        assert_eq!(log.messages()[0].id, MessageId::server("m1"));
        assert_eq!(log.messages()[0].timestamp, local);
    }

    #[test]
    fn test_ack_with_unknown_temp_id_is_noop() {
        let mut log = MessageLog::new();
        log.submit_user_message("hello");
        let before = log.messages().to_vec();

        let change = log.apply_ack(&TempId::new("temp-nope-1"), "m1", Some(Utc::now()));
        assert_eq!(change, LogChange::Unchanged);
        assert_eq!(log.messages(), before.as_slice());
    }

    #[test]
    fn test_duplicate_ack_is_noop() {
        let mut log = MessageLog::new();
        let (temp_id, _) = log.submit_user_message("hello");
        log.apply_ack(&temp_id, "m1", Some(Utc::now()));
        assert_eq!(log.apply_ack(&temp_id, "m1", Some(Utc::now())), LogChange::Unchanged);
    }

    #[test]
    fn test_ack_ignores_assistant_placeholder() {
        let mut log = MessageLog::new();
        log.apply_token_chunk("x");
        let placeholder = log.last().unwrap().id.as_temp().cloned().unwrap();

        assert_eq!(log.apply_ack(&placeholder, "m5", Some(Utc::now())), LogChange::Unchanged);
        assert!(log.is_streaming());
        assert_eq!(log.last().unwrap().content, "x");
    }
}
