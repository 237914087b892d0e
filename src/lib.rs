//! parley - multi-turn chat sessions
//!
//! Server side: an axum API that persists owner-scoped chats in SQLite and
//! calls a text generation provider. Client side: a conversation engine with
//! optimistic updates and incremental reply reveal.

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod llm;
pub mod model;
pub mod persistence;
