//! Client-side chat state
//!
//! `ChatStore` owns the session list, the selected chat id, per-chat busy
//! flags and the slot of the reply currently being revealed. Every change is
//! published as a [`StoreEvent`].
//!
//! Mutations with a server counterpart go through [`ChatStore::apply`],
//! which returns the [`Snapshot`] that [`ChatStore::restore`] uses to undo
//! exactly that mutation.

use crate::model::{new_chat_id, Chat, ChatId, Message, DEFAULT_CHAT_NAME};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No chat with id {0}")]
    UnknownChat(ChatId),
    #[error("A chat with id {0} already exists")]
    DuplicateChat(ChatId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// User-visible feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    SessionsChanged,
    SelectionChanged(Option<ChatId>),
    MessageAppended {
        chat_id: ChatId,
        index: usize,
        message: Message,
    },
    MessageUpdated {
        chat_id: ChatId,
        index: usize,
        content: String,
    },
    /// The message at `index` holds its final text; no more updates follow
    RevealFinished { chat_id: ChatId, index: usize },
    Notice(Notice),
}

/// A state change that has a server counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert(Chat),
    Append { chat_id: ChatId, message: Message },
    Rename { chat_id: ChatId, name: String },
    Remove { chat_id: ChatId },
}

/// The pre-mutation value of whatever a [`Mutation`] touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The chat did not exist
    Absent {
        chat_id: ChatId,
        previous_selection: Option<ChatId>,
    },
    Messages {
        chat_id: ChatId,
        messages: Vec<Message>,
    },
    Name {
        chat_id: ChatId,
        name: String,
    },
    /// The chat existed at `index`
    Present {
        index: usize,
        chat: Chat,
        was_selected: bool,
    },
}

/// The assistant message currently being revealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealSlot {
    pub token: u64,
    pub chat_id: ChatId,
    pub index: usize,
    pub full_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    /// Newest first
    pub sessions: Vec<Chat>,
    /// Resolved against `sessions` on every read
    pub selected: Option<ChatId>,
    pub busy: HashSet<ChatId>,
    pub reveal: Option<RevealSlot>,
}

impl StoreState {
    fn position(&self, chat_id: &str) -> Option<usize> {
        self.sessions.iter().position(|c| c.id == chat_id)
    }

    fn chat_mut(&mut self, chat_id: &str) -> Result<&mut Chat, StoreError> {
        self.sessions
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| StoreError::UnknownChat(chat_id.to_string()))
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        let id = self.selected.as_ref()?;
        self.sessions.iter().find(|c| &c.id == id)
    }

    fn insert_front(&mut self, chat: Chat) -> Snapshot {
        let snapshot = Snapshot::Absent {
            chat_id: chat.id.clone(),
            previous_selection: self.selected.clone(),
        };
        self.selected = Some(chat.id.clone());
        self.sessions.insert(0, chat);
        snapshot
    }

    /// Apply a mutation, returning what it replaced
    pub fn apply(&mut self, mutation: Mutation) -> Result<Snapshot, StoreError> {
        match mutation {
            Mutation::Insert(chat) => {
                if self.position(&chat.id).is_some() {
                    return Err(StoreError::DuplicateChat(chat.id));
                }
                Ok(self.insert_front(chat))
            }
            Mutation::Append { chat_id, message } => {
                let chat = self.chat_mut(&chat_id)?;
                let messages = chat.messages.clone();
                chat.messages.push(message);
                Ok(Snapshot::Messages { chat_id, messages })
            }
            Mutation::Rename { chat_id, name } => {
                let chat = self.chat_mut(&chat_id)?;
                let previous = std::mem::replace(&mut chat.name, name);
                Ok(Snapshot::Name {
                    chat_id,
                    name: previous,
                })
            }
            Mutation::Remove { chat_id } => {
                let index = self
                    .position(&chat_id)
                    .ok_or_else(|| StoreError::UnknownChat(chat_id.clone()))?;
                let chat = self.sessions.remove(index);
                let was_selected = self.selected.as_deref() == Some(chat_id.as_str());
                if was_selected {
                    self.selected = None;
                }
                Ok(Snapshot::Present {
                    index,
                    chat,
                    was_selected,
                })
            }
        }
    }

    /// Put back exactly what `snapshot` captured
    pub fn restore(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Absent {
                chat_id,
                previous_selection,
            } => {
                self.sessions.retain(|c| c.id != chat_id);
                self.selected = previous_selection;
            }
            Snapshot::Messages { chat_id, messages } => {
                if let Ok(chat) = self.chat_mut(&chat_id) {
                    chat.messages = messages;
                }
            }
            Snapshot::Name { chat_id, name } => {
                if let Ok(chat) = self.chat_mut(&chat_id) {
                    chat.name = name;
                }
            }
            Snapshot::Present {
                index,
                chat,
                was_selected,
            } => {
                if was_selected {
                    self.selected = Some(chat.id.clone());
                }
                let index = index.min(self.sessions.len());
                self.sessions.insert(index, chat);
            }
        }
    }

    /// Write the full reply into the slot's message and clear the slot
    fn finalize_reveal(&mut self) -> Option<(RevealSlot, bool)> {
        let slot = self.reveal.take()?;
        let changed = match self.chat_mut(&slot.chat_id) {
            Ok(chat) => match chat.messages.get_mut(slot.index) {
                Some(message) if message.content != slot.full_text => {
                    message.content.clone_from(&slot.full_text);
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        Some((slot, changed))
    }
}

/// Shared handle to the client state
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<Mutex<StoreState>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Copy of the whole state
    pub fn state(&self) -> StoreState {
        self.state.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> Vec<Chat> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn session(&self, chat_id: &str) -> Option<Chat> {
        let state = self.state.lock().unwrap();
        state.sessions.iter().find(|c| c.id == chat_id).cloned()
    }

    pub fn selected_id(&self) -> Option<ChatId> {
        let state = self.state.lock().unwrap();
        state.selected_chat().map(|c| c.id.clone())
    }

    pub fn selected(&self) -> Option<Chat> {
        self.state.lock().unwrap().selected_chat().cloned()
    }

    // ==================== Mutations ====================

    /// Insert a new empty chat at the top and select it
    pub fn create_session(&self, owner_id: &str) -> (Chat, Snapshot) {
        let chat = Chat::new(new_chat_id(), owner_id, DEFAULT_CHAT_NAME);
        let snapshot = self.state.lock().unwrap().insert_front(chat.clone());
        self.emit(StoreEvent::SessionsChanged);
        self.emit(StoreEvent::SelectionChanged(Some(chat.id.clone())));
        (chat, snapshot)
    }

    /// Select a chat. Returns false, changing nothing, if it is not present.
    pub fn select(&self, chat_id: &str) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.position(chat_id).is_none() {
                return false;
            }
            state.selected = Some(chat_id.to_string());
        }
        self.emit(StoreEvent::SelectionChanged(Some(chat_id.to_string())));
        true
    }

    pub fn apply(&self, mutation: Mutation) -> Result<Snapshot, StoreError> {
        let event = match &mutation {
            Mutation::Append { chat_id, message } => Some((chat_id.clone(), message.clone())),
            _ => None,
        };

        let (snapshot, selection, index) = {
            let mut state = self.state.lock().unwrap();
            let snapshot = state.apply(mutation)?;
            let index = match &snapshot {
                Snapshot::Messages { messages, .. } => messages.len(),
                _ => 0,
            };
            (snapshot, state.selected.clone(), index)
        };

        match (&snapshot, event) {
            (Snapshot::Messages { .. }, Some((chat_id, message))) => {
                self.emit(StoreEvent::MessageAppended {
                    chat_id,
                    index,
                    message,
                });
            }
            (Snapshot::Name { .. }, _) => self.emit(StoreEvent::SessionsChanged),
            (Snapshot::Absent { .. }, _) => {
                self.emit(StoreEvent::SessionsChanged);
                self.emit(StoreEvent::SelectionChanged(selection));
            }
            (Snapshot::Present { was_selected, .. }, _) => {
                self.emit(StoreEvent::SessionsChanged);
                if *was_selected {
                    self.emit(StoreEvent::SelectionChanged(None));
                }
            }
            _ => {}
        }

        Ok(snapshot)
    }

    pub fn restore(&self, snapshot: Snapshot) {
        let selection = {
            let mut state = self.state.lock().unwrap();
            state.restore(snapshot);
            state.selected.clone()
        };
        self.emit(StoreEvent::SessionsChanged);
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    pub fn append(&self, chat_id: &str, message: Message) -> Result<Snapshot, StoreError> {
        self.apply(Mutation::Append {
            chat_id: chat_id.to_string(),
            message,
        })
    }

    pub fn rename(&self, chat_id: &str, name: &str) -> Result<Snapshot, StoreError> {
        self.apply(Mutation::Rename {
            chat_id: chat_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Remove a chat; removing the selected chat clears the selection
    pub fn remove(&self, chat_id: &str) -> Result<Snapshot, StoreError> {
        self.apply(Mutation::Remove {
            chat_id: chat_id.to_string(),
        })
    }

    /// Re-sync from the server list, keeping the selection if it survived
    pub fn replace_sessions(&self, chats: Vec<Chat>) {
        let selection = {
            let mut state = self.state.lock().unwrap();
            self.emit_flushed(state.finalize_reveal());
            state.sessions = chats;
            let keep = state
                .selected
                .as_ref()
                .is_some_and(|id| state.sessions.iter().any(|c| &c.id == id));
            if !keep {
                state.selected = None;
            }
            state.selected.clone()
        };
        self.emit(StoreEvent::SessionsChanged);
        self.emit(StoreEvent::SelectionChanged(selection));
    }

    // ==================== Single-flight ====================

    /// Mark a send as outstanding. Returns false if one already is.
    pub fn try_begin_send(&self, chat_id: &str) -> bool {
        self.state.lock().unwrap().busy.insert(chat_id.to_string())
    }

    pub fn end_send(&self, chat_id: &str) {
        self.state.lock().unwrap().busy.remove(chat_id);
    }

    pub fn is_busy(&self, chat_id: &str) -> bool {
        self.state.lock().unwrap().busy.contains(chat_id)
    }

    // ==================== Reveal ====================

    /// Finalize any previous reveal, then append an empty placeholder for
    /// `reply` owned by `token`. Returns the placeholder's index.
    pub fn begin_reveal(
        &self,
        token: u64,
        chat_id: &str,
        reply: &Message,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().unwrap();
        self.emit_flushed(state.finalize_reveal());

        let placeholder = Message {
            content: String::new(),
            ..reply.clone()
        };
        let chat = state.chat_mut(chat_id)?;
        chat.messages.push(placeholder.clone());
        let index = chat.messages.len() - 1;

        state.reveal = Some(RevealSlot {
            token,
            chat_id: chat_id.to_string(),
            index,
            full_text: reply.content.clone(),
        });
        self.emit(StoreEvent::MessageAppended {
            chat_id: chat_id.to_string(),
            index,
            message: placeholder,
        });
        Ok(index)
    }

    /// Write one frame. Does nothing, returning false, unless `token` is
    /// the active reveal.
    pub fn reveal_step(&self, token: u64, content: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.reveal.clone() else {
            return false;
        };
        if slot.token != token {
            return false;
        }
        let Ok(chat) = state.chat_mut(&slot.chat_id) else {
            return false;
        };
        let Some(message) = chat.messages.get_mut(slot.index) else {
            return false;
        };
        content.clone_into(&mut message.content);

        // Published under the lock so no frame lands after a flush
        self.emit(StoreEvent::MessageUpdated {
            chat_id: slot.chat_id,
            index: slot.index,
            content: content.to_string(),
        });
        true
    }

    /// End the reveal owned by `token`, leaving the full reply in place
    pub fn finish_reveal(&self, token: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reveal.as_ref().map(|s| s.token) != Some(token) {
            return false;
        }
        self.emit_flushed(state.finalize_reveal());
        true
    }

    /// End whatever reveal is active. Returns its token.
    pub fn flush_reveal(&self) -> Option<u64> {
        let mut state = self.state.lock().unwrap();
        let flushed = state.finalize_reveal();
        let token = flushed.as_ref().map(|(slot, _)| slot.token);
        self.emit_flushed(flushed);
        token
    }

    /// The chat whose reply is being revealed
    pub fn revealing_chat(&self) -> Option<ChatId> {
        let state = self.state.lock().unwrap();
        state.reveal.as_ref().map(|s| s.chat_id.clone())
    }

    fn emit_flushed(&self, flushed: Option<(RevealSlot, bool)>) {
        let Some((slot, changed)) = flushed else {
            return;
        };
        if changed {
            self.emit(StoreEvent::MessageUpdated {
                chat_id: slot.chat_id.clone(),
                index: slot.index,
                content: slot.full_text,
            });
        }
        self.emit(StoreEvent::RevealFinished {
            chat_id: slot.chat_id,
            index: slot.index,
        });
    }

    // ==================== Notices ====================

    pub fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(StoreEvent::Notice(Notice {
            level,
            text: text.into(),
        }));
    }
}
