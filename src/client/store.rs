//! Persisted conversation history
//!
//! A single JSON file in the data directory. Persistence is best-effort:
//! a missing, unreadable, or corrupt file is an empty history, and save
//! failures are reported to the caller to log, never to crash on.

use std::path::PathBuf;

use crate::history::{sanitize_wire_history, ConversationTurn};
use crate::{Error, Result};

/// Loads and saves the serialized history array
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Create a store over the given file path
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load persisted turns; any failure yields an empty history
    ///
    /// The file contents are treated like wire data: entries are filtered
    /// down to valid user/assistant turns rather than schema-rejected.
    #[must_use]
    pub fn load(&self) -> Vec<ConversationTurn> {
        self.try_load().unwrap_or_else(|e| {
            tracing::debug!(error = %e, path = %self.path.display(), "no usable history");
            Vec::new()
        })
    }

    fn try_load(&self) -> Result<Vec<ConversationTurn>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        Ok(sanitize_wire_history(&values))
    }

    /// Persist the turns, creating the data directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written.
    pub fn save(&self, turns: &[ConversationTurn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let serialized = serde_json::to_string(turns)?;
        std::fs::write(&self.path, serialized)
            .map_err(|e| Error::Storage(format!("write {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested").join("history.json"));

        let turns = vec![
            ConversationTurn::new(Role::User, "hello"),
            ConversationTurn::new(Role::Assistant, "hi there"),
        ];
        store.save(&turns).unwrap();

        assert_eq!(store.load(), turns);
    }

    #[test]
    fn corrupt_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = HistoryStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn invalid_entries_are_filtered_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "content": "kept"}, {"role": "tool", "content": "dropped"}]"#,
        )
        .unwrap();

        let store = HistoryStore::new(path);
        let turns = store.load();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "kept");
    }
}
