use std::sync::Mutex;

use tokio::sync::mpsc;

use flux_types::models::ChatMessage;

/// Append-only message sequence for one channel: the REST history seed
/// followed by live messages in arrival order. No deduplication and no
/// reordering; the order is whatever the transport delivered.
#[derive(Default)]
pub struct MessageFeed {
    messages: Mutex<Vec<ChatMessage>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChatMessage>>>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feed contents with fetched channel history. Used once
    /// after `get_channel`, and available to embedders that choose to
    /// re-seed after a reconnect gap.
    pub fn seed(&self, history: Vec<ChatMessage>) {
        *self.messages.lock().expect("feed lock poisoned") = history;
    }

    /// Append a live message and fan it out to subscribers.
    pub fn append(&self, message: ChatMessage) {
        self.messages
            .lock()
            .expect("feed lock poisoned")
            .push(message.clone());

        let mut subs = self.subscribers.lock().expect("feed lock poisoned");
        subs.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.lock().expect("feed lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("feed lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream of messages appended after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("feed lock poisoned")
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn msg(id: i64, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            content: content.to_string(),
            user: "ada".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn append_preserves_arrival_order() {
        let feed = MessageFeed::new();
        feed.seed(vec![msg(1, "history")]);
        feed.append(msg(2, "a"));
        feed.append(msg(3, "b"));

        let ids: Vec<i64> = feed.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribers_see_only_new_messages() {
        let feed = MessageFeed::new();
        feed.append(msg(1, "before"));

        let mut rx = feed.subscribe();
        feed.append(msg(2, "after"));

        assert_eq!(rx.recv().await.unwrap().id, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn seed_replaces_contents() {
        let feed = MessageFeed::new();
        feed.append(msg(9, "stale"));
        feed.seed(vec![msg(1, "fresh")]);
        assert_eq!(feed.snapshot()[0].id, 1);
        assert_eq!(feed.len(), 1);
    }
}
