//! Mock providers and storage for testing

use super::traits::{ChatPatch, ChatStorage, DatabaseStorage, StorageError};
use crate::db::Database;
use crate::llm::{GenerationProvider, GenerationRequest, ProviderError};
use crate::model::Chat;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Mock Provider
// ============================================================================

/// Provider that returns queued completions
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: ProviderError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Gated Provider (for interleaving tests)
// ============================================================================

/// Provider that blocks inside `generate` until released
pub struct GatedProvider {
    response: String,
    /// Notified once a request has reached the provider
    pub request_started: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            request_started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Let the pending request complete
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl GenerationProvider for GatedProvider {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
        self.request_started.notify_one();
        self.release.notified().await;
        Ok(self.response.clone())
    }

    fn model_id(&self) -> &str {
        "gated"
    }
}

// ============================================================================
// Conflicting Storage
// ============================================================================

/// Storage whose saves always lose to a concurrent writer
pub struct ConflictingStorage {
    inner: DatabaseStorage,
    saves: AtomicUsize,
}

impl ConflictingStorage {
    pub fn new(db: Database) -> Self {
        Self {
            inner: DatabaseStorage::new(db),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStorage for ConflictingStorage {
    async fn get(&self, id: &str, owner_id: &str) -> Result<Option<Chat>, StorageError> {
        self.inner.get(id, owner_id).await
    }

    async fn insert(&self, chat: &Chat) -> Result<Chat, StorageError> {
        self.inner.insert(chat).await
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Chat>, StorageError> {
        self.inner.list(owner_id).await
    }

    async fn save(&self, chat: &Chat) -> Result<Chat, StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Conflict {
            id: chat.id.clone(),
        })
    }

    async fn update_field(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ChatPatch,
    ) -> Result<bool, StorageError> {
        self.inner.update_field(id, owner_id, patch).await
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<bool, StorageError> {
        self.inner.delete(id, owner_id).await
    }
}
