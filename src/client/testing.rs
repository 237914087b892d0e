//! Mock chat service for testing

use super::service::{Ack, ChatService, ServiceError};
use crate::model::{Chat, Message};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Blocks `generate` until released
pub struct Gate {
    /// Notified once a generate call is waiting
    pub started: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Service returning queued results. Unqueued rename/delete/create succeed.
pub struct MockChatService {
    replies: Mutex<VecDeque<Result<Message, ServiceError>>>,
    acks: Mutex<VecDeque<Result<Ack, ServiceError>>>,
    creates: Mutex<VecDeque<Result<(), ServiceError>>>,
    lists: Mutex<VecDeque<Result<Vec<Chat>, ServiceError>>>,
    gate: Option<Gate>,
    /// Record of all calls, e.g. `generate c1 hello`
    pub calls: Mutex<Vec<String>>,
}

impl MockChatService {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            acks: Mutex::new(VecDeque::new()),
            creates: Mutex::new(VecDeque::new()),
            lists: Mutex::new(VecDeque::new()),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A service whose generate calls wait for [`Gate::release`]
    pub fn gated() -> Self {
        Self {
            gate: Some(Gate {
                started: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }),
            ..Self::new()
        }
    }

    pub fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    pub fn queue_reply(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(Message::assistant(text)));
    }

    pub fn queue_generate_error(&self, error: ServiceError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Fail the next rename or delete
    pub fn queue_ack_error(&self, error: ServiceError) {
        self.acks.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_create_error(&self, error: ServiceError) {
        self.creates.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_list(&self, chats: Vec<Chat>) {
        self.lists.lock().unwrap().push_back(Ok(chats));
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_ack(&self, default: &str) -> Result<Ack, ServiceError> {
        self.acks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(default.to_string()))
    }
}

impl Default for MockChatService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatService for MockChatService {
    async fn list(&self) -> Result<Vec<Chat>, ServiceError> {
        self.record("list".to_string());
        self.lists
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create(&self, chat_id: &str, name: Option<&str>) -> Result<Chat, ServiceError> {
        self.record(format!("create {chat_id}"));
        let queued = self.creates.lock().unwrap().pop_front();
        queued.unwrap_or(Ok(()))?;
        Ok(Chat::new(chat_id, "mock-owner", name.unwrap_or("New Chat")))
    }

    async fn generate(&self, chat_id: &str, prompt: &str) -> Result<Message, ServiceError> {
        self.record(format!("generate {chat_id} {prompt}"));
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport("No mock reply queued".to_string())))
    }

    async fn rename(&self, chat_id: &str, name: &str) -> Result<Ack, ServiceError> {
        self.record(format!("rename {chat_id} {name}"));
        self.next_ack("Chat renamed successfully")
    }

    async fn delete(&self, chat_id: &str) -> Result<Ack, ServiceError> {
        self.record(format!("delete {chat_id}"));
        self.next_ack("Chat deleted successfully")
    }
}
