//! Incremental reveal of a completed reply
//!
//! The reply is already complete when it arrives; revealing it word by word
//! is presentation. Each session owns a token and a cancellation handle.
//! Starting a new session cancels the previous one and writes its full text
//! before anything else changes.

use super::store::{ChatStore, StoreError};
use crate::model::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Byte offsets where each frame ends.
///
/// Frame *k* is the text up to the end of its *k*-th whitespace-delimited
/// token. The last frame always covers the whole text, trailing whitespace
/// included; text without tokens yields one frame.
pub fn reveal_frames(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_token = false;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_token {
                ends.push(i);
                in_token = false;
            }
        } else {
            in_token = true;
        }
    }

    if in_token {
        ends.push(text.len());
    } else if let Some(last) = ends.last_mut() {
        *last = text.len();
    } else {
        ends.push(text.len());
    }
    ends
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Completed,
    /// Superseded by a newer session, or cancelled explicitly
    Cancelled,
}

/// A running reveal session
#[derive(Debug)]
pub struct RevealHandle {
    pub token: u64,
    task: JoinHandle<RevealOutcome>,
}

impl RevealHandle {
    /// Wait for the session to end
    pub async fn wait(self) -> RevealOutcome {
        self.task.await.unwrap_or(RevealOutcome::Cancelled)
    }
}

struct ActiveReveal {
    token: u64,
    chat_id: String,
    cancel: CancellationToken,
}

/// Schedules reveal frames into a [`ChatStore`]
pub struct StreamRevealer {
    store: ChatStore,
    interval: Duration,
    next_token: AtomicU64,
    active: Mutex<Option<ActiveReveal>>,
}

impl StreamRevealer {
    pub fn new(store: ChatStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            next_token: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    /// Start revealing `reply` as a new message of `chat_id`
    pub fn reveal(&self, chat_id: &str, reply: Message) -> Result<RevealHandle, StoreError> {
        self.cancel();

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.store.begin_reveal(token, chat_id, &reply)?;

        let cancel = CancellationToken::new();
        *self.active.lock().unwrap() = Some(ActiveReveal {
            token,
            chat_id: chat_id.to_string(),
            cancel: cancel.clone(),
        });

        tracing::debug!(chat_id = %chat_id, token, "Reveal started");

        let store = self.store.clone();
        let interval = self.interval;
        let text = reply.content;
        let task = tokio::spawn(async move {
            for end in reveal_frames(&text) {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return RevealOutcome::Cancelled,
                    () = tokio::time::sleep(interval) => {}
                }

                let frame = text.get(..end).unwrap_or(&text);
                if !store.reveal_step(token, frame) {
                    return RevealOutcome::Cancelled;
                }
            }

            if store.finish_reveal(token) {
                RevealOutcome::Completed
            } else {
                RevealOutcome::Cancelled
            }
        });

        Ok(RevealHandle { token, task })
    }

    /// Stop the active session, leaving its full reply in the store
    pub fn cancel(&self) {
        if let Some(active) = self.active.lock().unwrap().take() {
            active.cancel.cancel();
            tracing::debug!(chat_id = %active.chat_id, token = active.token, "Reveal cancelled");
        }
        self.store.flush_reveal();
    }

    /// Cancel the active session only if it belongs to `chat_id`
    pub fn cancel_chat(&self, chat_id: &str) -> bool {
        let targets_chat = self
            .active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|a| a.chat_id == chat_id);
        if targets_chat {
            self.cancel();
        }
        targets_chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::StoreEvent;

    fn frames(text: &str) -> Vec<&str> {
        reveal_frames(text)
            .into_iter()
            .map(|end| text.get(..end).unwrap())
            .collect()
    }

    #[test]
    fn test_frames_follow_tokens() {
        assert_eq!(
            frames("hello world foo"),
            vec!["hello", "hello world", "hello world foo"]
        );
    }

    #[test]
    fn test_frames_preserve_whitespace() {
        assert_eq!(frames("a  b\nc "), vec!["a", "a  b", "a  b\nc "]);
        assert_eq!(frames("  lead"), vec!["  lead"]);
    }

    #[test]
    fn test_tokenless_text_is_one_frame() {
        assert_eq!(frames(""), vec![""]);
        assert_eq!(frames(" \n "), vec![" \n "]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_writes_increasing_prefixes() {
        let store = ChatStore::new();
        let (chat, _) = store.create_session("alice");
        let revealer = StreamRevealer::new(store.clone(), Duration::from_millis(30));
        let mut rx = store.subscribe();

        let handle = revealer
            .reveal(&chat.id, Message::assistant("hello world foo"))
            .unwrap();
        assert_eq!(handle.wait().await, RevealOutcome::Completed);

        let mut updates = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StoreEvent::MessageUpdated { content, .. } = event {
                updates.push(content);
            }
        }
        assert_eq!(updates, vec!["hello", "hello world", "hello world foo"]);
        assert_eq!(
            store.session(&chat.id).unwrap().messages[0].content,
            "hello world foo"
        );
        assert_eq!(store.revealing_chat(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_flushes_full_text() {
        let store = ChatStore::new();
        let (chat, _) = store.create_session("alice");
        let revealer = StreamRevealer::new(store.clone(), Duration::from_millis(30));

        let handle = revealer
            .reveal(&chat.id, Message::assistant("one two three"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(31)).await;

        revealer.cancel();
        assert_eq!(handle.wait().await, RevealOutcome::Cancelled);
        assert_eq!(
            store.session(&chat.id).unwrap().messages[0].content,
            "one two three"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_chat_ignores_other_chats() {
        let store = ChatStore::new();
        let (first, _) = store.create_session("alice");
        let (second, _) = store.create_session("alice");
        let revealer = StreamRevealer::new(store.clone(), Duration::from_millis(30));

        let handle = revealer
            .reveal(&first.id, Message::assistant("a b"))
            .unwrap();
        assert!(!revealer.cancel_chat(&second.id));
        assert!(revealer.cancel_chat(&first.id));
        assert_eq!(handle.wait().await, RevealOutcome::Cancelled);
    }
}
