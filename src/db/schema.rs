//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chats_owner ON chats(owner_id, updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    chat_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,

    PRIMARY KEY (chat_id, position),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);
";

/// Columns selected for a chat row, in `parse_chat_row` order
pub const CHAT_COLUMNS: &str = "id, owner_id, name, created_at, updated_at, version";
