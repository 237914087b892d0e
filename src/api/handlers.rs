//! HTTP request handlers

use super::identity::Identity;
use super::types::{ApiEnvelope, CreateRequest, DeleteRequest, GenerateRequest, RenameRequest};
use super::AppState;
use crate::model::{Chat, Message, OwnerId};
use crate::persistence::ChatError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/ai", post(generate_reply))
        .route("/api/chat/rename", post(rename_chat))
        .route("/api/chat/delete", post(delete_chat))
        .route("/api/chat/create", post(create_chat))
        .route("/api/chat/get", get(list_chats))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Generation
// ============================================================

async fn generate_reply(
    State(state): State<AppState>,
    Identity(owner): Identity,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<Message>>, AppError> {
    let owner = identified(owner)?;
    let Json(req) = payload.map_err(AppError::rejected)?;

    let reply = state
        .chats
        .generate(Some(&owner), &req.chat_id, &req.prompt)
        .await?;

    Ok(Json(ApiEnvelope::data(reply)))
}

// ============================================================
// Lifecycle
// ============================================================

async fn rename_chat(
    State(state): State<AppState>,
    Identity(owner): Identity,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<()>>, AppError> {
    let owner = identified(owner).map_err(AppError::in_message)?;
    let Json(req) = payload.map_err(|e| AppError::rejected(e).in_message())?;

    state
        .chats
        .rename(Some(&owner), &req.chat_id, &req.name)
        .await
        .map_err(|e| AppError::from(e).in_message())?;

    Ok(Json(ApiEnvelope::message("Chat renamed successfully")))
}

async fn delete_chat(
    State(state): State<AppState>,
    Identity(owner): Identity,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<()>>, AppError> {
    let owner = identified(owner)?;
    let Json(req) = payload.map_err(AppError::rejected)?;

    state.chats.delete(Some(&owner), &req.chat_id).await?;

    Ok(Json(ApiEnvelope::message("Chat deleted successfully")))
}

async fn create_chat(
    State(state): State<AppState>,
    Identity(owner): Identity,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<Chat>>, AppError> {
    let owner = identified(owner)?;
    let Json(req) = payload.map_err(AppError::rejected)?;

    let chat = state
        .chats
        .create(Some(&owner), &req.chat_id, req.name.as_deref())
        .await?;

    Ok(Json(ApiEnvelope::data(chat)))
}

async fn list_chats(
    State(state): State<AppState>,
    Identity(owner): Identity,
) -> Result<Json<ApiEnvelope<Vec<Chat>>>, AppError> {
    let chats = state.chats.list(owner.as_ref()).await?;
    Ok(Json(ApiEnvelope::data(chats)))
}

/// The caller must be known before the body is looked at
fn identified(owner: Option<OwnerId>) -> Result<OwnerId, AppError> {
    owner.ok_or_else(|| ChatError::Unauthorized.into())
}

async fn get_version() -> &'static str {
    concat!("parley ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

/// Which envelope field carries the failure text
#[derive(Debug, Clone, Copy)]
enum FailureField {
    Error,
    Message,
}

#[derive(Debug)]
struct AppError {
    error: ChatError,
    field: FailureField,
}

impl AppError {
    fn rejected(rejection: JsonRejection) -> Self {
        ChatError::Validation(rejection.body_text()).into()
    }

    fn in_message(mut self) -> Self {
        self.field = FailureField::Message;
        self
    }
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        Self {
            error,
            field: FailureField::Error,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Provider(_) => StatusCode::BAD_GATEWAY,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self.error, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self.error, "Request rejected");
        }

        let text = self.error.to_string();
        let body = match self.field {
            FailureField::Error => ApiEnvelope::<()>::error(text),
            FailureField::Message => ApiEnvelope::<()>::failure_message(text),
        };

        (status, Json(body)).into_response()
    }
}
