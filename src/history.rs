use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn from_db(raw: &str) -> Self {
        match raw {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// One stored conversation entry. Immutable once written; `created_at` is
/// epoch seconds. The serialized form (`role`, `content`, `createdAt`) is the
/// contract export collaborators consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

/// An open SQLite session bound to one identity's conversation.
struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open conversation db {:?}", path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Conversation db lock poisoned: {}", e))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
            [],
        )?;
        Ok(())
    }

    fn insert(&self, role: Role, content: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO messages (role, content, created_at) VALUES (?1, ?2, ?3)",
            params![role.as_str(), content, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Latest `limit` messages, oldest first. The rowid is the authoritative
    /// append order; `created_at` has one-second resolution and admits ties.
    fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        let limit = limit.max(1);
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM messages ORDER BY id DESC LIMIT ?1",
        )?;
        let mut messages = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Message {
                    role: Role::from_db(&row.get::<_, String>(0)?),
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // Query returns newest-first; flip to chronological.
        messages.reverse();
        Ok(messages)
    }
}

/// Lazily-materialized per-identity storage. Each identity gets one SQLite
/// file under the registry root and at most one live handle; operations on
/// different identities never share a lock.
pub struct ConversationRegistry {
    root: PathBuf,
    handles: DashMap<Uuid, Arc<ConversationStore>>,
}

impl ConversationRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create conversation dir {:?}", root))?;
        Ok(Self {
            root,
            handles: DashMap::new(),
        })
    }

    fn db_path(&self, identity: Uuid) -> PathBuf {
        self.root.join(format!("{}.db", identity))
    }

    /// Cached handle for `identity`, creating storage on first use. The map
    /// entry holds its shard lock through creation, so two racing first-time
    /// opens cannot both create the database.
    fn open(&self, identity: Uuid) -> Result<Arc<ConversationStore>> {
        if let Some(handle) = self.handles.get(&identity) {
            return Ok(handle.value().clone());
        }
        match self.handles.entry(identity) {
            Entry::Occupied(occupied) => Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let store = Arc::new(ConversationStore::open(&self.db_path(identity))?);
                vacant.insert(store.clone());
                Ok(store)
            }
        }
    }

    /// Persist one message. Storage failures are logged and swallowed; the
    /// conversation is left unchanged.
    pub fn append(&self, identity: Uuid, role: Role, content: &str) {
        let result = self
            .open(identity)
            .and_then(|store| store.insert(role, content));
        if let Err(e) = result {
            tracing::error!(
                "Failed to record {} message for {}: {:#}",
                role.as_str(),
                identity,
                e
            );
        }
    }

    /// Up to `limit` most recent messages in chronological order (`limit` is
    /// clamped to at least 1). Returns an empty list on any storage failure.
    pub fn conversation(&self, identity: Uuid, limit: usize) -> Vec<Message> {
        match self.open(identity).and_then(|store| store.recent(limit)) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to read conversation for {}: {:#}", identity, e);
                Vec::new()
            }
        }
    }

    /// Drop the cached handle and delete the identity's database. The next
    /// `append` or `conversation` recreates storage from empty.
    pub fn clear(&self, identity: Uuid) {
        // Close the connection before the file goes away.
        self.handles.remove(&identity);
        let path = self.db_path(identity);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete conversation db {:?}: {}", path, e);
            }
        }
    }

    /// Serialize the most recent `limit` messages as a JSON array of
    /// `{role, content, createdAt}` for export collaborators.
    pub fn export_json(&self, identity: Uuid, limit: usize) -> Result<String> {
        serde_json::to_string(&self.conversation(identity, limit))
            .context("Failed to serialize conversation export")
    }

    /// Release every cached handle. In-flight operations holding a handle
    /// finish on their own; new operations reopen storage.
    pub fn close_all(&self) {
        self.handles.clear();
    }
}
