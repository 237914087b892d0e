//! Server-side chat operations
//!
//! `ChatPersistence` resolves the caller, loads the caller's chat document,
//! mutates it and writes it back through [`ChatStorage`]. Generation appends
//! the user turn before calling the provider and the assistant turn after.

#[cfg(test)]
pub mod testing;
mod traits;

pub use traits::{ChatPatch, ChatStorage, DatabaseStorage, StorageError};

use crate::llm::{GenerationProvider, GenerationRequest, ProviderError};
use crate::model::{Chat, Message, OwnerId, DEFAULT_CHAT_NAME};
use std::sync::Arc;
use thiserror::Error;

/// How many times a save is re-applied on top of a concurrent write
const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Chat not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Generation failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl From<StorageError> for ChatError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ChatError::NotFound,
            other => ChatError::Persistence(other.to_string()),
        }
    }
}

/// Behavior switches for generation
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceOptions {
    /// Send earlier turns along with the prompt
    pub forward_history: bool,
    /// Remove the stored prompt again when the provider fails
    pub rollback_failed_prompt: bool,
}

pub struct ChatPersistence {
    storage: Arc<dyn ChatStorage>,
    provider: Arc<dyn GenerationProvider>,
    options: PersistenceOptions,
}

impl ChatPersistence {
    pub fn new(
        storage: Arc<dyn ChatStorage>,
        provider: Arc<dyn GenerationProvider>,
        options: PersistenceOptions,
    ) -> Self {
        Self {
            storage,
            provider,
            options,
        }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Append `prompt` to the chat, generate a reply and append that too.
    ///
    /// The user turn is durable before the provider is called. On provider
    /// failure it stays stored unless `rollback_failed_prompt` is set.
    pub async fn generate(
        &self,
        owner: Option<&OwnerId>,
        chat_id: &str,
        prompt: &str,
    ) -> Result<Message, ChatError> {
        let owner = require_owner(owner)?;
        require_chat_id(chat_id)?;
        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("Prompt must not be empty".to_string()));
        }

        let chat = self
            .storage
            .get(chat_id, owner)
            .await?
            .ok_or(ChatError::NotFound)?;

        let history = if self.options.forward_history {
            chat.messages.clone()
        } else {
            Vec::new()
        };

        let user_message = Message::user(prompt);
        let appended = user_message.clone();
        let chat = self
            .commit(chat, move |c| c.messages.push(appended.clone()))
            .await?;

        let request = GenerationRequest {
            prompt: prompt.to_string(),
            history,
        };

        match self.provider.generate(&request).await {
            Ok(text) => {
                let reply = Message::assistant(text);
                let appended = reply.clone();
                self.commit(chat, move |c| c.messages.push(appended.clone()))
                    .await?;
                tracing::info!(chat_id = %chat_id, owner = %owner, "Generated reply");
                Ok(reply)
            }
            Err(e) => {
                if self.options.rollback_failed_prompt {
                    self.rollback_prompt(chat, &user_message).await;
                }
                Err(e.into())
            }
        }
    }

    /// Rename a chat. Renaming a chat the caller does not have is a no-op.
    pub async fn rename(
        &self,
        owner: Option<&OwnerId>,
        chat_id: &str,
        name: &str,
    ) -> Result<(), ChatError> {
        let owner = require_owner(owner)?;
        require_chat_id(chat_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("Name must not be empty".to_string()));
        }

        let matched = self
            .storage
            .update_field(chat_id, owner, &ChatPatch::name(name))
            .await?;
        if !matched {
            tracing::debug!(chat_id = %chat_id, owner = %owner, "Rename matched no chat");
        }
        Ok(())
    }

    /// Delete a chat and its messages. Deleting twice is not an error.
    pub async fn delete(&self, owner: Option<&OwnerId>, chat_id: &str) -> Result<(), ChatError> {
        let owner = require_owner(owner)?;
        require_chat_id(chat_id)?;

        let removed = self.storage.delete(chat_id, owner).await?;
        tracing::info!(chat_id = %chat_id, owner = %owner, removed, "Deleted chat");
        Ok(())
    }

    /// Create an empty chat under a client-chosen id
    pub async fn create(
        &self,
        owner: Option<&OwnerId>,
        chat_id: &str,
        name: Option<&str>,
    ) -> Result<Chat, ChatError> {
        let owner = require_owner(owner)?;
        require_chat_id(chat_id)?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_CHAT_NAME);

        let chat = self
            .storage
            .insert(&Chat::new(chat_id, owner.as_str(), name))
            .await?;
        tracing::info!(chat_id = %chat.id, owner = %owner, "Created chat");
        Ok(chat)
    }

    pub async fn list(&self, owner: Option<&OwnerId>) -> Result<Vec<Chat>, ChatError> {
        let owner = require_owner(owner)?;
        Ok(self.storage.list(owner).await?)
    }

    /// Apply `mutate` and save, re-reading and re-applying on a version conflict
    async fn commit<F>(&self, mut chat: Chat, mutate: F) -> Result<Chat, ChatError>
    where
        F: Fn(&mut Chat) + Send,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut candidate = chat.clone();
            mutate(&mut candidate);

            match self.storage.save(&candidate).await {
                Ok(saved) => return Ok(saved),
                Err(StorageError::Conflict { id }) => {
                    tracing::warn!(chat_id = %id, attempt, "Concurrent update, re-applying");
                    chat = self
                        .storage
                        .get(&chat.id, &chat.owner_id)
                        .await?
                        .ok_or(ChatError::NotFound)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ChatError::Persistence(format!(
            "chat {} kept changing; gave up after {MAX_SAVE_ATTEMPTS} attempts",
            chat.id
        )))
    }

    async fn rollback_prompt(&self, chat: Chat, user_message: &Message) {
        let target = user_message.clone();
        let result = self
            .commit(chat, move |c| {
                if let Some(pos) = c.messages.iter().rposition(|m| *m == target) {
                    c.messages.remove(pos);
                }
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to roll back prompt after provider failure");
        }
    }
}

fn require_owner(owner: Option<&OwnerId>) -> Result<&OwnerId, ChatError> {
    owner.ok_or(ChatError::Unauthorized)
}

fn require_chat_id(chat_id: &str) -> Result<(), ChatError> {
    if chat_id.trim().is_empty() {
        return Err(ChatError::Validation("chatId is required".to_string()));
    }
    Ok(())
}
