//! Tab transcript persistence
//!
//! [`KeyValueStore`] is a flat string-to-string store, the same shape as
//! browser local storage. [`TabStore`] maps tab names onto it: each
//! transcript lives under `prefix + tab name` as a JSON message array,
//! and the creation order of tabs lives under `prefix + "\u{1f}tab_order"`.
//! Tab names never contain control characters, so no tab key can collide
//! with the order key.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::state::Transcript;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    /// All keys, in insertion order
    fn keys(&self) -> Result<Vec<String>>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}

/// SQLite-backed store, one row per key
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening tab database {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        // Upsert keeps the original rowid, so key order stays stable
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY rowid")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

/// In-memory store for temporary sessions and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<(String, String)>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`remove` calls made so far
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.writes += 1;
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.writes += 1;
        self.entries.retain(|(k, _)| k != key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|(k, _)| k.clone()).collect())
    }
}

/// Persistence adapter from tab names to transcripts
pub struct TabStore<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> TabStore<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    fn key(&self, tab: &str) -> String {
        format!("{}{}", self.prefix, tab)
    }

    /// Key holding the JSON array of tab names in creation order
    fn order_key(&self) -> String {
        format!("{}\u{1f}tab_order", self.prefix)
    }

    pub fn save(&mut self, tab: &str, transcript: &Transcript) -> Result<()> {
        anyhow::ensure!(
            !tab.chars().any(char::is_control),
            "tab name {tab:?} contains control characters"
        );
        let json = transcript.to_json()?;
        self.store.set(&self.key(tab), &json)?;

        let mut order = self.read_order()?;
        if !order.iter().any(|name| name == tab) {
            order.push(tab.to_string());
            self.write_order(&order)?;
        }
        Ok(())
    }

    /// Load a tab's transcript. Missing or unreadable data yields an empty one.
    pub fn load(&self, tab: &str) -> Result<Transcript> {
        let Some(json) = self.store.get(&self.key(tab))? else {
            return Ok(Transcript::new());
        };

        match Transcript::from_json(&json) {
            Ok(transcript) => Ok(transcript),
            Err(e) => {
                tracing::warn!(tab, "stored transcript is corrupt, starting empty: {e}");
                Ok(Transcript::new())
            }
        }
    }

    pub fn delete(&mut self, tab: &str) -> Result<()> {
        self.store.remove(&self.key(tab))?;

        let mut order = self.read_order()?;
        let before = order.len();
        order.retain(|name| name != tab);
        if order.len() != before {
            self.write_order(&order)?;
        }
        Ok(())
    }

    pub fn contains(&self, tab: &str) -> Result<bool> {
        Ok(self.store.get(&self.key(tab))?.is_some())
    }

    /// Tab names in creation order. Prefixed keys that were written without
    /// order metadata follow, in the store's own key order.
    pub fn list_tab_names(&self) -> Result<Vec<String>> {
        let order_key = self.order_key();
        let stored: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| *key != order_key)
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect();

        let mut names: Vec<String> = self
            .read_order()?
            .into_iter()
            .filter(|name| stored.contains(name))
            .collect();
        for name in stored {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn read_order(&self) -> Result<Vec<String>> {
        let Some(json) = self.store.get(&self.order_key())? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("tab order metadata is corrupt, ignoring it: {e}");
            Vec::new()
        }))
    }

    fn write_order(&mut self, order: &[String]) -> Result<()> {
        let json = serde_json::to_string(order)?;
        self.store.set(&self.order_key(), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatMessage;
    use tempfile::tempdir;

    fn sample() -> Transcript {
        Transcript::from(vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello")])
    }

    #[test]
    fn test_save_then_load() {
        let mut tabs = TabStore::new(MemoryStore::new(), "chat_app_");
        tabs.save("Work", &sample()).unwrap();

        assert_eq!(tabs.load("Work").unwrap(), sample());
        assert!(tabs.inner().get("chat_app_Work").unwrap().is_some());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tabs = TabStore::new(MemoryStore::new(), "chat_app_");
        assert!(tabs.load("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_then_load_is_empty() {
        let mut tabs = TabStore::new(MemoryStore::new(), "chat_app_");
        tabs.save("Work", &sample()).unwrap();
        tabs.delete("Work").unwrap();

        assert!(tabs.load("Work").unwrap().is_empty());
        assert!(!tabs.contains("Work").unwrap());
        assert!(tabs.list_tab_names().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_transcript_loads_empty() {
        let mut store = MemoryStore::new();
        store.set("chat_app_Broken", "[{\"role\":").unwrap();
        let tabs = TabStore::new(store, "chat_app_");

        assert!(tabs.load("Broken").unwrap().is_empty());
        assert_eq!(tabs.list_tab_names().unwrap(), vec!["Broken"]);
    }

    #[test]
    fn test_list_follows_creation_order() {
        let mut tabs = TabStore::new(MemoryStore::new(), "chat_app_");
        for name in ["zeta", "alpha", "mid"] {
            tabs.save(name, &Transcript::new()).unwrap();
        }
        // Re-saving must not move a tab
        tabs.save("zeta", &sample()).unwrap();

        assert_eq!(tabs.list_tab_names().unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unordered_keys_follow_ordered_ones() {
        let mut store = MemoryStore::new();
        store.set("chat_app_legacy", "[]").unwrap();
        store.set("other_app_key", "x").unwrap();
        let mut tabs = TabStore::new(store, "chat_app_");
        tabs.save("new", &Transcript::new()).unwrap();

        assert_eq!(tabs.list_tab_names().unwrap(), vec!["new", "legacy"]);
    }

    #[test]
    fn test_corrupt_order_metadata_is_ignored() {
        let mut store = MemoryStore::new();
        store.set("chat_app_a", "[]").unwrap();
        store.set("chat_app_\u{1f}tab_order", "not json").unwrap();
        let tabs = TabStore::new(store, "chat_app_");

        assert_eq!(tabs.list_tab_names().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_tab_named_like_order_metadata() {
        let mut tabs = TabStore::new(MemoryStore::new(), "tabchat.");
        tabs.save("first", &Transcript::new()).unwrap();
        tabs.save("tab_order", &Transcript::from(vec![ChatMessage::user("hi")])).unwrap();
        tabs.save("last", &Transcript::new()).unwrap();

        assert_eq!(tabs.list_tab_names().unwrap(), vec!["first", "tab_order", "last"]);
        assert_eq!(tabs.load("tab_order").unwrap().len(), 1);
    }

    #[test]
    fn test_control_characters_in_name_are_rejected() {
        let mut tabs = TabStore::new(MemoryStore::new(), "chat_app_");
        assert!(tabs.save("\u{1f}tab_order", &Transcript::new()).is_err());
        assert!(tabs.list_tab_names().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_store_basics() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.set("b", "1").unwrap();
        store.set("a", "2").unwrap();
        store.set("b", "3").unwrap();

        assert_eq!(store.get("b").unwrap().as_deref(), Some("3"));
        assert_eq!(store.keys().unwrap(), vec!["b", "a"]);

        store.remove("b").unwrap();
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_sqlite_persists_across_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("tabs.db");
        {
            let mut tabs = TabStore::new(SqliteStore::open(&path).unwrap(), "chat_app_");
            tabs.save("second", &Transcript::new()).unwrap();
            tabs.save("first", &sample()).unwrap();
        }

        let tabs = TabStore::new(SqliteStore::open(&path).unwrap(), "chat_app_");
        assert_eq!(tabs.list_tab_names().unwrap(), vec!["second", "first"]);
        assert_eq!(tabs.load("first").unwrap(), sample());
    }
}
