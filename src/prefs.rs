#[cfg(test)]
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
#[cfg(test)]
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_COLUMNS_KEY: &str = "defaultColumns";
pub const HIDDEN_BLOCKS_KEY: &str = "hiddenBlocksMap";

/// Global column choice, stored as `"auto"`, `"2"`, `"3"` or `"4"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnPreference {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
}

impl ColumnPreference {
    pub const ALL: [ColumnPreference; 4] = [Self::Auto, Self::Two, Self::Three, Self::Four];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
        }
    }

    /// Explicit column count, or `None` for `auto`.
    pub fn fixed(self) -> Option<u8> {
        match self {
            Self::Auto => None,
            Self::Two => Some(2),
            Self::Three => Some(3),
            Self::Four => Some(4),
        }
    }
}

impl fmt::Display for ColumnPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "2" => Ok(Self::Two),
            "3" => Ok(Self::Three),
            "4" => Ok(Self::Four),
            other => bail!("invalid column preference '{}': expected auto, 2, 3 or 4", other),
        }
    }
}

pub type HiddenBlocks = BTreeSet<usize>;

/// Key-value persistence behind the preferences. Writes replace the whole
/// value stored under a key.
pub trait PreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

impl<T: PreferenceStore + ?Sized> PreferenceStore for &T {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }
}

// ── SQLite ──

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(Self { conn })
    }

    /// All stored keys with their raw JSON text.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM preferences ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PreferenceStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value.to_string()],
        )?;
        Ok(())
    }
}

// ── In-memory ──

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
}

#[cfg(test)]
impl PreferenceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

// ── Typed access ──

/// Typed view over a store. Reads never fail: anything missing or unreadable
/// falls back to the default.
pub struct Preferences<S> {
    store: S,
}

impl<S: PreferenceStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn columns(&self) -> ColumnPreference {
        match self.store.get(DEFAULT_COLUMNS_KEY).await {
            Ok(Some(v)) => serde_json::from_value(v).unwrap_or_else(|e| {
                warn!("Ignoring unreadable {}: {}", DEFAULT_COLUMNS_KEY, e);
                ColumnPreference::default()
            }),
            Ok(None) => ColumnPreference::default(),
            Err(e) => {
                warn!("Failed to read {}: {}", DEFAULT_COLUMNS_KEY, e);
                ColumnPreference::default()
            }
        }
    }

    pub async fn set_columns(&self, columns: ColumnPreference) -> Result<()> {
        self.store
            .set(DEFAULT_COLUMNS_KEY, Value::from(columns.as_str()))
            .await
    }

    /// The whole url → ids map. Entries that do not parse are skipped.
    pub async fn hidden_map(&self) -> BTreeMap<String, HiddenBlocks> {
        let raw = match self.store.get(HIDDEN_BLOCKS_KEY).await {
            Ok(Some(v)) => v,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", HIDDEN_BLOCKS_KEY, e);
                return BTreeMap::new();
            }
        };
        let Value::Object(entries) = raw else {
            warn!("Ignoring unreadable {}: not an object", HIDDEN_BLOCKS_KEY);
            return BTreeMap::new();
        };
        entries
            .iter()
            .filter_map(|(url, ids)| match parse_ids(ids) {
                Some(ids) => Some((url.clone(), ids)),
                None => {
                    warn!(url = %url, "Ignoring unreadable hidden block entry");
                    None
                }
            })
            .collect()
    }

    pub async fn hidden_blocks(&self, url: &str) -> HiddenBlocks {
        self.hidden_map().await.remove(url).unwrap_or_default()
    }

    /// Replace this URL's entry and write the map back. Other entries are
    /// carried over as stored, readable or not. A failed read aborts the
    /// write.
    pub async fn save_hidden_blocks(&self, url: &str, ids: &HiddenBlocks) -> Result<()> {
        let mut entries = match self.store.get(HIDDEN_BLOCKS_KEY).await? {
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                warn!("Replacing unreadable {}: {}", HIDDEN_BLOCKS_KEY, other);
                serde_json::Map::new()
            }
            None => serde_json::Map::new(),
        };
        entries.insert(url.to_string(), serde_json::to_value(ids)?);
        self.store.set(HIDDEN_BLOCKS_KEY, Value::Object(entries)).await
    }
}

/// Block ids as numbers, or as numeric strings (`["1", "3"]`).
fn parse_ids(value: &Value) -> Option<HiddenBlocks> {
    value
        .as_array()?
        .iter()
        .map(|id| match id {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails every operation.
    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            bail!("disk on fire")
        }
        async fn set(&self, _key: &str, _value: Value) -> Result<()> {
            bail!("disk on fire")
        }
    }

    #[test]
    fn column_preference_strings() {
        for pref in ColumnPreference::ALL {
            assert_eq!(pref.as_str().parse::<ColumnPreference>().unwrap(), pref);
            assert_eq!(serde_json::to_value(pref).unwrap(), Value::from(pref.as_str()));
        }
        assert!("5".parse::<ColumnPreference>().is_err());
        assert_eq!(ColumnPreference::Three.fixed(), Some(3));
        assert_eq!(ColumnPreference::Auto.fixed(), None);
    }

    #[tokio::test]
    async fn defaults_when_absent() {
        let prefs = Preferences::new(MemoryStore::default());
        assert_eq!(prefs.columns().await, ColumnPreference::Auto);
        assert!(prefs.hidden_blocks("https://x/").await.is_empty());
    }

    #[tokio::test]
    async fn defaults_when_store_fails() {
        let prefs = Preferences::new(BrokenStore);
        assert_eq!(prefs.columns().await, ColumnPreference::Auto);
        assert!(prefs.hidden_map().await.is_empty());
        assert!(prefs.set_columns(ColumnPreference::Two).await.is_err());
    }

    #[tokio::test]
    async fn defaults_when_value_malformed() {
        let store = MemoryStore::default();
        store.set(DEFAULT_COLUMNS_KEY, Value::from("seven")).await.unwrap();
        store.set(HIDDEN_BLOCKS_KEY, Value::from(12)).await.unwrap();
        let prefs = Preferences::new(store);
        assert_eq!(prefs.columns().await, ColumnPreference::Auto);
        assert!(prefs.hidden_map().await.is_empty());
    }

    #[tokio::test]
    async fn hidden_save_merges_other_urls() {
        let prefs = Preferences::new(MemoryStore::default());
        prefs
            .save_hidden_blocks("https://a/", &BTreeSet::from([1, 3]))
            .await
            .unwrap();
        prefs
            .save_hidden_blocks("https://b/", &BTreeSet::from([0]))
            .await
            .unwrap();
        assert_eq!(prefs.hidden_blocks("https://a/").await, BTreeSet::from([1, 3]));
        assert_eq!(prefs.hidden_blocks("https://b/").await, BTreeSet::from([0]));

        let raw = prefs.store().get(HIDDEN_BLOCKS_KEY).await.unwrap().unwrap();
        assert_eq!(raw, serde_json::json!({"https://a/": [1, 3], "https://b/": [0]}));
    }

    #[tokio::test]
    async fn string_ids_are_read_and_kept() {
        let store = MemoryStore::default();
        store
            .set(
                HIDDEN_BLOCKS_KEY,
                serde_json::json!({"https://a/": ["1", "3"], "https://b/": [0, 2], "https://x/": "junk"}),
            )
            .await
            .unwrap();
        let prefs = Preferences::new(store);
        assert_eq!(prefs.hidden_blocks("https://a/").await, BTreeSet::from([1, 3]));
        assert!(prefs.hidden_blocks("https://x/").await.is_empty());

        prefs
            .save_hidden_blocks("https://c/", &BTreeSet::from([4]))
            .await
            .unwrap();
        let raw = prefs.store().get(HIDDEN_BLOCKS_KEY).await.unwrap().unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "https://a/": ["1", "3"],
                "https://b/": [0, 2],
                "https://c/": [4],
                "https://x/": "junk"
            })
        );
    }

    /// Reads fail once `fail_reads` is set; writes always go through.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_reads: std::cell::Cell<bool>,
    }

    impl PreferenceStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            if self.fail_reads.get() {
                bail!("read timed out");
            }
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.inner.set(key, value).await
        }
    }

    #[tokio::test]
    async fn failed_read_aborts_hidden_save() {
        let prefs = Preferences::new(FlakyStore::default());
        prefs
            .save_hidden_blocks("https://a/", &BTreeSet::from([1]))
            .await
            .unwrap();
        prefs
            .save_hidden_blocks("https://b/", &BTreeSet::from([0, 2]))
            .await
            .unwrap();

        prefs.store().fail_reads.set(true);
        assert!(prefs
            .save_hidden_blocks("https://c/", &BTreeSet::from([3]))
            .await
            .is_err());

        prefs.store().fail_reads.set(false);
        let map = prefs.hidden_map().await;
        assert_eq!(map.len(), 2);
        assert_eq!(map["https://b/"], BTreeSet::from([0, 2]));
        assert!(!map.contains_key("https://c/"));
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let prefs = Preferences::new(SqliteStore::in_memory().unwrap());
        prefs.set_columns(ColumnPreference::Four).await.unwrap();
        prefs.set_columns(ColumnPreference::Three).await.unwrap();
        assert_eq!(prefs.columns().await, ColumnPreference::Three);

        prefs
            .save_hidden_blocks("https://tabs/x", &BTreeSet::from([2]))
            .await
            .unwrap();
        assert_eq!(prefs.hidden_blocks("https://tabs/x").await, BTreeSet::from([2]));

        let keys: Vec<String> = prefs.store().entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![DEFAULT_COLUMNS_KEY, HIDDEN_BLOCKS_KEY]);
    }

    #[tokio::test]
    async fn sqlite_file_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("playmode-prefs-{}", std::process::id()));
        let path = dir.join("prefs.sqlite");
        let path = path.to_str().unwrap();
        {
            let prefs = Preferences::new(SqliteStore::open(path).unwrap());
            prefs
                .save_hidden_blocks("https://u/", &BTreeSet::from([5, 6]))
                .await
                .unwrap();
        }
        let prefs = Preferences::new(SqliteStore::open(path).unwrap());
        assert_eq!(prefs.hidden_blocks("https://u/").await, BTreeSet::from([5, 6]));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
