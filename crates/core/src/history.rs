//! Clipboard text history.
//!
//! A newest-first list of copied text with favorites, notes, and a size
//! bound that never evicts a favorite. [`SharedHistory`] is what the capture
//! core writes recognized text and preserved recording paths into.

use crate::clipboard::ClipboardSink;
use crate::error::{AppError, Result};
use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub content: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Set when a favorite is deleted from the history view but kept in favorites.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden_from_history: bool,
}

impl HistoryEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            is_favorite: false,
            note: None,
            hidden_from_history: false,
        }
    }
}

/// Which list a delete was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryView {
    History,
    Favorites,
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    entries: Vec<HistoryEntry>,
    max_items: usize,
}

impl History {
    pub fn new(max_items: usize) -> Self {
        Self::with_entries(Vec::new(), max_items)
    }

    pub fn with_entries(entries: Vec<HistoryEntry>, max_items: usize) -> Self {
        Self { entries, max_items }
    }

    /// All entries, newest first, hidden ones included.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Entries shown in the history view.
    pub fn visible(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| !e.hidden_from_history)
    }

    pub fn favorites(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.is_favorite)
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Records `content` as the newest entry.
    ///
    /// Empty text is ignored. Text already present moves to the front and keeps
    /// its favorite flag. Returns the new entry, or `None` if it was itself
    /// the oldest non-favorite and got evicted.
    pub fn add(&mut self, content: &str) -> Option<&HistoryEntry> {
        if content.is_empty() {
            return None;
        }

        let mut entry = HistoryEntry::new(content);
        if let Some(pos) = self.entries.iter().position(|e| e.content == content) {
            let existing = self.entries.remove(pos);
            entry.is_favorite = existing.is_favorite;
        }
        let id = entry.id.clone();
        self.entries.insert(0, entry);
        self.evict();
        self.get(&id)
    }

    /// Drops the oldest non-favorites until the bound holds.
    ///
    /// When only favorites are left the list stays oversized.
    fn evict(&mut self) {
        while self.entries.len() > self.max_items {
            match self.entries.iter().rposition(|e| !e.is_favorite) {
                Some(pos) => {
                    self.entries.remove(pos);
                }
                None => break,
            }
        }
    }

    pub fn set_max_items(&mut self, max_items: usize) {
        self.max_items = max_items;
        self.evict();
    }

    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.is_favorite = !entry.is_favorite;
                if !entry.is_favorite {
                    entry.hidden_from_history = false;
                }
                true
            }
            None => false,
        }
    }

    pub fn set_note(&mut self, id: &str, note: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.note = if note.trim().is_empty() {
                    None
                } else {
                    Some(note.to_string())
                };
                true
            }
            None => false,
        }
    }

    /// Deletes an entry as seen from `view`.
    ///
    /// From the history view a favorite is only hidden; from the favorites
    /// view it is removed for good.
    pub fn delete(&mut self, id: &str, view: HistoryView) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        match view {
            HistoryView::History if self.entries[pos].is_favorite => {
                self.entries[pos].hidden_from_history = true;
            }
            _ => {
                self.entries.remove(pos);
            }
        }
        true
    }

    /// Removes every non-favorite and hides the favorites from the history view.
    pub fn clear(&mut self) {
        self.entries.retain(|e| e.is_favorite);
        for entry in &mut self.entries {
            entry.hidden_from_history = true;
        }
    }

    /// Puts favorites in the order of `ids` without moving anything else.
    ///
    /// Favorites keep the slots they occupy in the full list; only which
    /// favorite sits in which slot changes. Unlisted favorites follow the
    /// listed ones in their previous order.
    pub fn reorder_favorites(&mut self, ids: &[String]) {
        let slots: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_favorite)
            .map(|(i, _)| i)
            .collect();
        let mut remaining: Vec<HistoryEntry> = slots.iter().map(|&i| self.entries[i].clone()).collect();
        let mut ordered = Vec::with_capacity(remaining.len());
        for id in ids {
            if let Some(pos) = remaining.iter().position(|e| &e.id == id) {
                ordered.push(remaining.remove(pos));
            }
        }
        ordered.append(&mut remaining);
        for (slot, entry) in slots.into_iter().zip(ordered) {
            self.entries[slot] = entry;
        }
    }
}

/// On-disk entry shape; early versions stored bare strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Legacy(String),
    Entry(Box<PartialEntry>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialEntry {
    id: Option<String>,
    content: String,
    timestamp: Option<String>,
    #[serde(default)]
    is_favorite: bool,
    note: Option<String>,
    #[serde(default)]
    hidden_from_history: bool,
}

impl From<StoredEntry> for HistoryEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Legacy(content) => HistoryEntry::new(content),
            StoredEntry::Entry(partial) => {
                let fresh = HistoryEntry::new(partial.content.clone());
                HistoryEntry {
                    id: partial.id.unwrap_or(fresh.id),
                    content: partial.content,
                    timestamp: partial.timestamp.unwrap_or(fresh.timestamp),
                    is_favorite: partial.is_favorite,
                    note: partial.note,
                    hidden_from_history: partial.hidden_from_history,
                }
            }
        }
    }
}

/// JSON file holding the history list.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the user's data directory (e.g., `~/.local/share/clipcap/history.json`).
    pub fn default_location() -> Option<Self> {
        ProjectDirs::from("", "clipcap", "clipcap")
            .map(|dirs| Self::new(dirs.data_dir().join("history.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads entries, upgrading legacy records. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let stored: Vec<StoredEntry> = serde_json::from_str(&content)?;
        Ok(stored.into_iter().map(HistoryEntry::from).collect())
    }

    pub fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

/// Where the capture core appends text (recognized text, preserved file paths).
pub trait HistorySink: Send + Sync {
    fn add_entry(&self, text: &str);
}

/// History shared between the capture core, the clipboard watcher and the CLI,
/// persisted after every mutation.
#[derive(Clone)]
pub struct SharedHistory {
    inner: Arc<Mutex<History>>,
    store: Option<HistoryStore>,
}

impl SharedHistory {
    pub fn new(history: History, store: Option<HistoryStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(history)),
            store,
        }
    }

    /// Loads from `store`; an unreadable file starts an empty history.
    pub fn open(store: HistoryStore, max_items: usize) -> Self {
        let entries = store.load().unwrap_or_else(|e| {
            log::warn!("Could not read history {}: {}", store.path().display(), e);
            Vec::new()
        });
        let mut history = History::with_entries(entries, max_items);
        history.set_max_items(max_items);
        let shared = Self::new(history, Some(store));
        shared.persist();
        shared
    }

    /// Runs `f` against the history and persists afterwards.
    pub fn update<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        let result = {
            let mut history = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut history)
        };
        self.persist();
        result
    }

    /// Puts the content of entry `id` back on the clipboard.
    pub fn copy_to(&self, id: &str, clipboard: &dyn ClipboardSink) -> Result<String> {
        let content = self
            .snapshot()
            .get(id)
            .map(|e| e.content.clone())
            .ok_or_else(|| AppError::UnknownEntry(id.to_string()))?;
        clipboard.write_text(&content)?;
        log::info!("Copied history entry {} to clipboard", id);
        Ok(content)
    }

    pub fn snapshot(&self) -> History {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let entries = self.snapshot().entries;
        if let Err(e) = store.save(&entries) {
            log::error!("Failed to save history: {}", e);
        }
    }
}

impl HistorySink for SharedHistory {
    fn add_entry(&self, text: &str) {
        self.update(|history| {
            history.add(text);
        });
    }
}
