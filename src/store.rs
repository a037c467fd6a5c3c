//! Draft persistence: the source text survives restarts.
//!
//! One small JSON file under the platform config directory, written on
//! every text change outside voice capture and read once at startup.
//! Failures are logged and otherwise ignored; persistence is best-effort.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Draft {
    source_text: String,
}

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Store rooted at the platform config directory
    /// (e.g. `~/.config/lingolive/draft.json` on Linux).
    pub fn open_default() -> Option<Self> {
        let dir = dirs::config_dir()?.join("lingolive");
        if let Err(e) = fs::create_dir_all(&dir) {
            log::warn!("could not create config directory {}: {e}", dir.display());
            return None;
        }
        Some(Self {
            path: dir.join("draft.json"),
        })
    }

    /// Store at an explicit path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read back the persisted draft. `None` when there is no draft yet
    /// or the file cannot be parsed.
    pub fn load_source_text(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Draft>(&contents) {
            Ok(draft) => Some(draft.source_text),
            Err(e) => {
                log::warn!("ignoring unreadable draft {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn save_source_text(&self, text: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(&Draft {
            source_text: text.to_string(),
        })?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing draft to {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("draft.json"));
        store.save_source_text("hello world").unwrap();
        assert_eq!(store.load_source_text().as_deref(), Some("hello world"));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("draft.json"));
        assert_eq!(store.load_source_text(), None);
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Store::at(path).load_source_text(), None);
    }

    #[test]
    fn save_overwrites_previous_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("draft.json"));
        store.save_source_text("first").unwrap();
        store.save_source_text("").unwrap();
        assert_eq!(store.load_source_text().as_deref(), Some(""));
    }
}
