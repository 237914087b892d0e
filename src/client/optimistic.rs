//! Speculative client mutations with a defined revert path
//!
//! Each operation snapshots what it is about to change, applies the change
//! to the [`ChatStore`] at once, then issues the matching [`ChatService`]
//! call. A failed call restores the snapshot and publishes a notice.

use super::reveal::{RevealHandle, StreamRevealer};
use super::service::{ChatService, ServiceError};
use super::store::{ChatStore, Mutation, NoticeLevel, Snapshot, StoreError};
use crate::model::{Chat, ChatId, Message, OwnerId};
use std::sync::Arc;
use thiserror::Error;

pub const BUSY_NOTICE: &str = "Wait for the previous prompt response";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    /// A send for this chat is still outstanding
    #[error("Wait for the previous prompt response")]
    Busy(ChatId),
    #[error("No chat with id {0}")]
    NotFound(ChatId),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OptimisticUpdater {
    store: ChatStore,
    service: Arc<dyn ChatService>,
    revealer: Arc<StreamRevealer>,
    owner_id: OwnerId,
}

impl OptimisticUpdater {
    pub fn new(
        store: ChatStore,
        service: Arc<dyn ChatService>,
        revealer: Arc<StreamRevealer>,
        owner_id: impl Into<OwnerId>,
    ) -> Self {
        Self {
            store,
            service,
            revealer,
            owner_id: owner_id.into(),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Send a prompt and start revealing the reply.
    ///
    /// The user message appears immediately. The chat stays busy until the
    /// round trip resolves; the reveal continues in the background. Dropping
    /// the future mid-flight reverts the message and frees the chat.
    pub async fn send(&self, chat_id: &str, prompt: &str) -> Result<RevealHandle, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::Validation("Prompt must not be empty".to_string()));
        }
        if self.store.session(chat_id).is_none() {
            return Err(ClientError::NotFound(chat_id.to_string()));
        }
        if !self.store.try_begin_send(chat_id) {
            self.store.notify(NoticeLevel::Error, BUSY_NOTICE);
            return Err(ClientError::Busy(chat_id.to_string()));
        }
        let mut flight = InFlight {
            store: &self.store,
            chat_id,
            snapshot: None,
        };

        self.revealer.cancel();
        flight.snapshot = Some(self.store.apply(Mutation::Append {
            chat_id: chat_id.to_string(),
            message: Message::user(prompt),
        })?);

        match self.service.generate(chat_id, prompt).await {
            Ok(reply) => {
                flight.keep();
                Ok(self.revealer.reveal(chat_id, reply)?)
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Generation failed, reverting");
                drop(flight);
                self.store
                    .notify(NoticeLevel::Error, format!("Failed to get a response: {e}"));
                Err(e.into())
            }
        }
    }

    /// Create an empty chat, selected at the top of the list
    pub async fn create_chat(&self) -> Result<Chat, ClientError> {
        let (chat, snapshot) = self.store.create_session(&self.owner_id);

        match self.service.create(&chat.id, None).await {
            Ok(_) => Ok(chat),
            Err(e) => {
                self.store.restore(snapshot);
                self.store
                    .notify(NoticeLevel::Error, format!("Failed to create chat: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn rename(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation("Name must not be empty".to_string()));
        }

        let snapshot = self.store.rename(chat_id, name)?;

        match self.service.rename(chat_id, name).await {
            Ok(_) => {
                self.store
                    .notify(NoticeLevel::Info, "Chat renamed successfully");
                Ok(())
            }
            Err(e) => {
                self.store.restore(snapshot);
                self.store
                    .notify(NoticeLevel::Error, format!("Failed to rename chat: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn delete(&self, chat_id: &str) -> Result<(), ClientError> {
        self.revealer.cancel_chat(chat_id);
        let snapshot = self.store.remove(chat_id)?;

        match self.service.delete(chat_id).await {
            Ok(_) => {
                self.store
                    .notify(NoticeLevel::Info, "Chat deleted successfully");
                Ok(())
            }
            Err(e) => {
                self.store.restore(snapshot);
                self.store
                    .notify(NoticeLevel::Error, format!("Failed to delete chat: {e}"));
                Err(e.into())
            }
        }
    }

    /// Replace local sessions with the server's list
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        match self.service.list().await {
            Ok(chats) => {
                let count = chats.len();
                self.revealer.cancel();
                self.store.replace_sessions(chats);
                Ok(count)
            }
            Err(e) => {
                self.store
                    .notify(NoticeLevel::Error, format!("Failed to load chats: {e}"));
                Err(e.into())
            }
        }
    }
}

/// One outstanding send. Dropping it clears the busy flag and, unless the
/// send was kept, takes the optimistic prompt back out.
struct InFlight<'a> {
    store: &'a ChatStore,
    chat_id: &'a str,
    snapshot: Option<Snapshot>,
}

impl InFlight<'_> {
    fn keep(&mut self) {
        self.snapshot = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.store.restore(snapshot);
        }
        self.store.end_send(self.chat_id);
    }
}
