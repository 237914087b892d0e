//! Database module for parley
//!
//! Provides owner-scoped persistence for chats and their messages.

mod schema;

pub use schema::*;

use crate::model::{now_millis, Chat, Message, Role};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Chat not found: {0}")]
    ChatNotFound(String),
    #[error("Chat {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i64 },
    #[error("Chat id already in use: {0}")]
    ChatIdTaken(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Chat Operations ====================

    /// Insert a new chat with its messages.
    ///
    /// Inserting an id the same owner already holds returns the stored chat
    /// unchanged, so clients can retry creation safely.
    pub fn insert_chat(&self, chat: &Chat) -> DbResult<Chat> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO chats (id, owner_id, name, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT(id) DO NOTHING",
            params![
                chat.id,
                chat.owner_id,
                chat.name,
                chat.created_at,
                chat.updated_at
            ],
        )?;

        if inserted == 0 {
            let existing = select_chat(&tx, &chat.id, &chat.owner_id)?;
            return existing.ok_or_else(|| DbError::ChatIdTaken(chat.id.clone()));
        }

        insert_messages(&tx, &chat.id, &chat.messages)?;
        tx.commit()?;

        Ok(Chat {
            version: 0,
            ..chat.clone()
        })
    }

    /// Get a chat by id, scoped to its owner
    pub fn get_chat(&self, id: &str, owner_id: &str) -> DbResult<Option<Chat>> {
        let conn = self.conn.lock().unwrap();
        select_chat(&conn, id, owner_id)
    }

    /// List an owner's chats, most recently updated first
    pub fn list_chats(&self, owner_id: &str) -> DbResult<Vec<Chat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE owner_id = ?1 ORDER BY updated_at DESC, created_at DESC"
        ))?;

        let rows = stmt.query_map(params![owner_id], parse_chat_row)?;
        let mut chats = rows.collect::<Result<Vec<_>, _>>()?;
        for chat in &mut chats {
            chat.messages = select_messages(&conn, &chat.id)?;
        }
        Ok(chats)
    }

    /// Replace the whole chat document.
    ///
    /// Succeeds only while the stored version still equals `chat.version`;
    /// the returned chat carries the incremented version.
    pub fn save_chat(&self, chat: &Chat) -> DbResult<Chat> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_millis();

        let updated = tx.execute(
            "UPDATE chats SET name = ?1, updated_at = ?2, version = version + 1
             WHERE id = ?3 AND owner_id = ?4 AND version = ?5",
            params![chat.name, now, chat.id, chat.owner_id, chat.version],
        )?;

        if updated == 0 {
            return Err(if chat_exists(&tx, &chat.id, &chat.owner_id)? {
                DbError::VersionConflict {
                    id: chat.id.clone(),
                    expected: chat.version,
                }
            } else {
                DbError::ChatNotFound(chat.id.clone())
            });
        }

        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat.id])?;
        insert_messages(&tx, &chat.id, &chat.messages)?;
        tx.commit()?;

        Ok(Chat {
            updated_at: now,
            version: chat.version + 1,
            ..chat.clone()
        })
    }

    /// Rename a chat. Returns whether a chat matched.
    pub fn rename_chat(&self, id: &str, owner_id: &str, name: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE chats SET name = ?1, updated_at = ?2, version = version + 1
             WHERE id = ?3 AND owner_id = ?4",
            params![name, now_millis(), id, owner_id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a chat and all its messages. Returns whether a chat matched.
    pub fn delete_chat(&self, id: &str, owner_id: &str) -> DbResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !chat_exists(&tx, id, owner_id)? {
            return Ok(false);
        }

        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM chats WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        tx.commit()?;
        Ok(true)
    }
}

fn chat_exists(conn: &Connection, id: &str, owner_id: &str) -> DbResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1 AND owner_id = ?2)",
        params![id, owner_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn select_chat(conn: &Connection, id: &str, owner_id: &str) -> DbResult<Option<Chat>> {
    let chat = conn
        .query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1 AND owner_id = ?2"),
            params![id, owner_id],
            parse_chat_row,
        )
        .optional()?;

    match chat {
        Some(mut chat) => {
            chat.messages = select_messages(conn, &chat.id)?;
            Ok(Some(chat))
        }
        None => Ok(None),
    }
}

fn select_messages(conn: &Connection, chat_id: &str) -> DbResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT role, content, timestamp FROM messages WHERE chat_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![chat_id], parse_message_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
}

fn insert_messages(conn: &Connection, chat_id: &str, messages: &[Message]) -> DbResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO messages (chat_id, position, role, content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, message) in messages.iter().enumerate() {
        stmt.execute(params![
            chat_id,
            i64::try_from(position).unwrap_or(i64::MAX),
            message.role.as_str(),
            message.content,
            message.timestamp,
        ])?;
    }
    Ok(())
}

/// Parse a chat row (without messages) from the database
fn parse_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        messages: Vec::new(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        version: row.get(5)?,
    })
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(0)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown message role: {role}").into(),
        )
    })?;
    Ok(Message {
        role,
        content: row.get(1)?,
        timestamp: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(db: &Database) -> Chat {
        db.insert_chat(&Chat::new("chat-1", "alice", "New Chat"))
            .unwrap()
    }

    #[test]
    fn test_insert_and_get_chat() {
        let db = Database::open_in_memory().unwrap();
        let chat = seeded(&db);

        let fetched = db.get_chat("chat-1", "alice").unwrap().unwrap();
        assert_eq!(fetched, chat);
        assert!(fetched.messages.is_empty());
        assert_eq!(fetched.version, 0);
    }

    #[test]
    fn test_wrong_owner_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        seeded(&db);

        assert!(db.get_chat("chat-1", "mallory").unwrap().is_none());
        assert!(!db.rename_chat("chat-1", "mallory", "pwned").unwrap());
        assert!(!db.delete_chat("chat-1", "mallory").unwrap());

        let chat = db.get_chat("chat-1", "alice").unwrap().unwrap();
        assert_eq!(chat.name, "New Chat");
    }

    #[test]
    fn test_insert_is_idempotent_for_owner() {
        let db = Database::open_in_memory().unwrap();
        seeded(&db);

        let again = db
            .insert_chat(&Chat::new("chat-1", "alice", "Other name"))
            .unwrap();
        assert_eq!(again.name, "New Chat");

        let taken = db.insert_chat(&Chat::new("chat-1", "bob", "Mine"));
        assert!(matches!(taken, Err(DbError::ChatIdTaken(_))));
    }

    #[test]
    fn test_save_appends_messages_in_order() {
        let db = Database::open_in_memory().unwrap();
        let mut chat = seeded(&db);

        chat.messages.push(Message::user("Hello"));
        chat.messages.push(Message::assistant("Hi there!"));
        let saved = db.save_chat(&chat).unwrap();
        assert_eq!(saved.version, 1);

        let reloaded = db.get_chat("chat-1", "alice").unwrap().unwrap();
        assert_eq!(reloaded.messages.len(), 2);
        assert_eq!(reloaded.messages[0].role, Role::User);
        assert_eq!(reloaded.last_message(), chat.messages.last());
        assert_eq!(reloaded.version, 1);
    }

    #[test]
    fn test_stale_save_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut stale = seeded(&db);

        // A concurrent rename bumps the version
        assert!(db.rename_chat("chat-1", "alice", "Renamed").unwrap());

        stale.messages.push(Message::user("lost?"));
        let result = db.save_chat(&stale);
        assert!(matches!(
            result,
            Err(DbError::VersionConflict { expected: 0, .. })
        ));

        let stored = db.get_chat("chat-1", "alice").unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert!(stored.messages.is_empty());
    }

    #[test]
    fn test_save_missing_chat_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let result = db.save_chat(&Chat::new("ghost", "alice", "x"));
        assert!(matches!(result, Err(DbError::ChatNotFound(_))));
    }

    #[test]
    fn test_delete_removes_messages() {
        let db = Database::open_in_memory().unwrap();
        let mut chat = seeded(&db);
        chat.messages.push(Message::user("bye"));
        db.save_chat(&chat).unwrap();

        assert!(db.delete_chat("chat-1", "alice").unwrap());
        assert!(!db.delete_chat("chat-1", "alice").unwrap());
        assert!(db.get_chat("chat-1", "alice").unwrap().is_none());

        let conn = db.conn.lock().unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_unknown_stored_role_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let mut chat = seeded(&db);
        chat.messages.push(Message::user("hi"));
        db.save_chat(&chat).unwrap();

        db.conn
            .lock()
            .unwrap()
            .execute("UPDATE messages SET role = 'system'", [])
            .unwrap();

        let result = db.get_chat("chat-1", "alice");
        assert!(matches!(
            result,
            Err(DbError::Sqlite(rusqlite::Error::FromSqlConversionFailure(..)))
        ));
    }

    #[test]
    fn test_list_is_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        seeded(&db);
        db.insert_chat(&Chat::new("chat-2", "alice", "Second")).unwrap();
        db.insert_chat(&Chat::new("chat-3", "bob", "Bob's")).unwrap();

        let chats = db.list_chats("alice").unwrap();
        assert_eq!(chats.len(), 2);
        assert!(chats.iter().all(|c| c.owner_id == "alice"));
    }

    #[test]
    fn test_messages_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");

        {
            let db = Database::open(&path).unwrap();
            let mut chat = seeded(&db);
            chat.messages.push(Message::user("persist me"));
            db.save_chat(&chat).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let chat = db.get_chat("chat-1", "alice").unwrap().unwrap();
        assert_eq!(chat.last_message().unwrap().content, "persist me");
    }
}
