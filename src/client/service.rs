//! Request/response wrapper around the chat endpoints

use crate::api::identity::USER_ID_HEADER;
use crate::api::types::{ApiEnvelope, CreateRequest, DeleteRequest, GenerateRequest, RenameRequest};
use crate::model::{Chat, Message};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never produced a readable response
    #[error("Network error: {0}")]
    Transport(String),
    /// The server answered with `success: false`
    #[error("{0}")]
    Rejected(String),
}

/// Acknowledgement text from rename/delete
pub type Ack = String;

/// One call per logical chat operation, no retries
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn list(&self) -> Result<Vec<Chat>, ServiceError>;

    async fn create(&self, chat_id: &str, name: Option<&str>) -> Result<Chat, ServiceError>;

    async fn generate(&self, chat_id: &str, prompt: &str) -> Result<Message, ServiceError>;

    async fn rename(&self, chat_id: &str, name: &str) -> Result<Ack, ServiceError>;

    async fn delete(&self, chat_id: &str) -> Result<Ack, ServiceError>;
}

#[async_trait]
impl<T: ChatService + ?Sized> ChatService for Arc<T> {
    async fn list(&self) -> Result<Vec<Chat>, ServiceError> {
        (**self).list().await
    }

    async fn create(&self, chat_id: &str, name: Option<&str>) -> Result<Chat, ServiceError> {
        (**self).create(chat_id, name).await
    }

    async fn generate(&self, chat_id: &str, prompt: &str) -> Result<Message, ServiceError> {
        (**self).generate(chat_id, prompt).await
    }

    async fn rename(&self, chat_id: &str, name: &str) -> Result<Ack, ServiceError> {
        (**self).rename(chat_id, name).await
    }

    async fn delete(&self, chat_id: &str) -> Result<Ack, ServiceError> {
        (**self).delete(chat_id).await
    }
}

/// `ChatService` over HTTP
pub struct HttpChatService {
    client: Client,
    base_url: String,
    user_id: String,
}

impl HttpChatService {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>, ServiceError> {
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(USER_ID_HEADER, &self.user_id)
            .json(body);
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope<T>, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        // Failures keep the envelope, so the body is parsed whatever the status
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            ServiceError::Transport(format!("Unexpected response (HTTP {status}): {e}"))
        })
    }
}

fn require_data<T>(envelope: ApiEnvelope<T>) -> Result<T, ServiceError> {
    envelope
        .into_result()
        .map_err(ServiceError::Rejected)?
        .ok_or_else(|| ServiceError::Transport("Response carried no data".to_string()))
}

fn require_ack(envelope: ApiEnvelope<()>) -> Result<Ack, ServiceError> {
    let message = envelope.message.clone().unwrap_or_default();
    envelope.into_result().map_err(ServiceError::Rejected)?;
    Ok(message)
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn list(&self) -> Result<Vec<Chat>, ServiceError> {
        let request = self
            .client
            .get(format!("{}/api/chat/get", self.base_url))
            .header(USER_ID_HEADER, &self.user_id);
        require_data(Self::send(request).await?)
    }

    async fn create(&self, chat_id: &str, name: Option<&str>) -> Result<Chat, ServiceError> {
        let body = CreateRequest {
            chat_id: chat_id.to_string(),
            name: name.map(str::to_string),
        };
        require_data(self.post("/api/chat/create", &body).await?)
    }

    async fn generate(&self, chat_id: &str, prompt: &str) -> Result<Message, ServiceError> {
        let body = GenerateRequest {
            chat_id: chat_id.to_string(),
            prompt: prompt.to_string(),
        };
        require_data(self.post("/api/chat/ai", &body).await?)
    }

    async fn rename(&self, chat_id: &str, name: &str) -> Result<Ack, ServiceError> {
        let body = RenameRequest {
            chat_id: chat_id.to_string(),
            name: name.to_string(),
        };
        require_ack(self.post("/api/chat/rename", &body).await?)
    }

    async fn delete(&self, chat_id: &str) -> Result<Ack, ServiceError> {
        let body = DeleteRequest {
            chat_id: chat_id.to_string(),
        };
        require_ack(self.post("/api/chat/delete", &body).await?)
    }
}
