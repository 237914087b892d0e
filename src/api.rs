//! HTTP API for parley

mod handlers;
pub mod identity;
pub mod types;

pub use handlers::create_router;

use crate::persistence::ChatPersistence;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chats: Arc<ChatPersistence>,
}

impl AppState {
    pub fn new(chats: Arc<ChatPersistence>) -> Self {
        Self { chats }
    }
}
