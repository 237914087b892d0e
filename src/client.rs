//! Client conversation engine
//!
//! [`ChatStore`] holds the state, [`OptimisticUpdater`] drives mutations
//! through a [`ChatService`], and [`StreamRevealer`] plays replies back into
//! the store.

mod optimistic;
#[cfg(test)]
mod proptests;
mod reveal;
mod service;
mod store;
#[cfg(test)]
pub mod testing;

pub use optimistic::{ClientError, OptimisticUpdater, BUSY_NOTICE};
pub use reveal::{reveal_frames, RevealHandle, RevealOutcome, StreamRevealer};
pub use service::{Ack, ChatService, HttpChatService, ServiceError};
pub use store::{
    ChatStore, Mutation, Notice, NoticeLevel, RevealSlot, Snapshot, StoreError, StoreEvent,
    StoreState,
};
