//! Storage capability used by chat persistence
//!
//! Every operation is scoped by `(id, owner)`; a chat under another owner
//! is indistinguishable from a missing one.

use crate::db::{Database, DbError};
use crate::model::Chat;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored document changed since it was read
    #[error("chat {id} was modified concurrently")]
    Conflict { id: String },
    #[error("chat not found: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict { id, .. } => StorageError::Conflict { id },
            DbError::ChatNotFound(id) => StorageError::NotFound(id),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Partial update for a single chat field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPatch {
    pub name: Option<String>,
}

impl ChatPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Owner-scoped chat document store
#[async_trait]
pub trait ChatStorage: Send + Sync {
    async fn get(&self, id: &str, owner_id: &str) -> Result<Option<Chat>, StorageError>;

    /// Insert a new chat; re-inserting an id the owner already holds returns the stored chat
    /// and an id another owner holds is `NotFound`
    async fn insert(&self, chat: &Chat) -> Result<Chat, StorageError>;

    /// The owner's chats, most recently updated first
    async fn list(&self, owner_id: &str) -> Result<Vec<Chat>, StorageError>;

    /// Replace the whole document if `chat.version` is still current.
    /// Returns the stored chat with its new version.
    async fn save(&self, chat: &Chat) -> Result<Chat, StorageError>;

    /// Apply a patch. Returns whether a chat matched.
    async fn update_field(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ChatPatch,
    ) -> Result<bool, StorageError>;

    /// Returns whether a chat was removed
    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, StorageError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatStorage + ?Sized> ChatStorage for Arc<T> {
    async fn get(&self, id: &str, owner_id: &str) -> Result<Option<Chat>, StorageError> {
        (**self).get(id, owner_id).await
    }

    async fn insert(&self, chat: &Chat) -> Result<Chat, StorageError> {
        (**self).insert(chat).await
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Chat>, StorageError> {
        (**self).list(owner_id).await
    }

    async fn save(&self, chat: &Chat) -> Result<Chat, StorageError> {
        (**self).save(chat).await
    }

    async fn update_field(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ChatPatch,
    ) -> Result<bool, StorageError> {
        (**self).update_field(id, owner_id, patch).await
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, StorageError> {
        (**self).delete(id, owner_id).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as ChatStorage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStorage for DatabaseStorage {
    async fn get(&self, id: &str, owner_id: &str) -> Result<Option<Chat>, StorageError> {
        Ok(self.db.get_chat(id, owner_id)?)
    }

    async fn insert(&self, chat: &Chat) -> Result<Chat, StorageError> {
        // An id held by another owner must look like any other missing chat
        match self.db.insert_chat(chat) {
            Ok(chat) => Ok(chat),
            Err(DbError::ChatIdTaken(id)) => Err(StorageError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Chat>, StorageError> {
        Ok(self.db.list_chats(owner_id)?)
    }

    async fn save(&self, chat: &Chat) -> Result<Chat, StorageError> {
        Ok(self.db.save_chat(chat)?)
    }

    async fn update_field(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ChatPatch,
    ) -> Result<bool, StorageError> {
        match &patch.name {
            Some(name) => Ok(self.db.rename_chat(id, owner_id, name)?),
            None => Ok(self.db.get_chat(id, owner_id)?.is_some()),
        }
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, StorageError> {
        Ok(self.db.delete_chat(id, owner_id)?)
    }
}
