//! Bounded undo/redo history over a single text value.
//!
//! The ring keeps at most [`MAX_HISTORY_ENTRIES`] snapshots; the oldest is
//! evicted on overflow. The entry at the cursor is always the current text.
//! Re-entrancy (re-recording the value a replay just applied) is prevented
//! by tagging every text-change event with an [`EditSource`] instead of a
//! mutable "applying history" flag: `HistoryReplay` events are never pushed.

/// Maximum number of history entries to keep.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Origin of a text-change event. Determines whether the change is
/// re-recorded into history and whether it may trigger translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditSource {
    /// The user typed, pasted or cleared text.
    UserEdit,
    /// A voice-session transcript fragment was appended.
    Transcript,
    /// An undo/redo result is being applied; never re-recorded.
    HistoryReplay,
}

#[derive(Debug, Clone)]
pub struct EditHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl EditHistory {
    /// Create a history seeded with one initial entry so the cursor
    /// invariant `cursor < len` holds from the start.
    pub fn new(initial: String) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &str {
        &self.entries[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false // always holds at least the seed entry
    }

    /// Record a new snapshot. A no-op when the text matches the current
    /// entry. Any redo tail past the cursor is truncated first; on
    /// overflow the oldest entry is dropped and the cursor shifted so the
    /// current entry stays addressable.
    pub fn push(&mut self, text: &str) {
        if self.entries[self.cursor] == text {
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(text.to_string());
        self.cursor += 1;
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            self.entries.remove(0);
            self.cursor -= 1;
        }
    }

    /// Step back one entry, returning the text to apply. `None` at the
    /// oldest entry.
    pub fn undo(&mut self) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    /// Step forward one entry, returning the text to apply. `None` at the
    /// newest entry.
    pub fn redo(&mut self) -> Option<String> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }
}
