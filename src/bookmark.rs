use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::ReadingPosition;

pub const STATE_FILENAME: &str = "state.json";

/// A reading position that can be restored in a later run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub title: String,
    pub file_path: String,
    /// Item reference inside the book.
    pub item: String,
    pub cursor: usize,
    #[serde(default)]
    pub is_html: bool,
    pub saved_at: DateTime<Utc>,
}

impl SavedPosition {
    pub fn new(title: &str, file_path: &str, is_html: bool, position: &ReadingPosition) -> Self {
        Self {
            title: title.to_string(),
            file_path: file_path.to_string(),
            item: position.item.clone(),
            cursor: position.cursor,
            is_html,
            saved_at: Utc::now(),
        }
    }

    /// `Title (item) @ line`, as shown in bookmark listings.
    pub fn describe(&self) -> String {
        format!(
            "{} ({}) @ {} - {}",
            self.title,
            self.item,
            self.cursor,
            self.saved_at.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Last-read position and explicit bookmarks, persisted as JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReadingState {
    #[serde(default)]
    pub last_read: Option<SavedPosition>,
    #[serde(default)]
    pub bookmarks: Vec<SavedPosition>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl ReadingState {
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn with_file(file_path: &Path) -> Self {
        Self {
            file_path: Some(file_path.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load reading state from {path:?}: {e}");
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &Path) -> anyhow::Result<Self> {
        if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            let mut state: Self = serde_json::from_str(&content)?;
            state.file_path = Some(file_path.to_path_buf());
            Ok(state)
        } else {
            Ok(Self::with_file(file_path))
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        match &self.file_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, serde_json::to_string_pretty(self)?)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn set_last_read(&mut self, position: SavedPosition) {
        self.last_read = Some(position);
        self.persist();
    }

    /// Adds a bookmark unless the exact same place is already bookmarked.
    /// Returns whether it was added.
    pub fn add_bookmark(&mut self, position: SavedPosition) -> bool {
        let duplicate = self.bookmarks.iter().any(|b| {
            b.file_path == position.file_path && b.item == position.item && b.cursor == position.cursor
        });
        if duplicate {
            return false;
        }
        self.bookmarks.push(position);
        self.persist();
        true
    }

    pub fn remove_bookmark(&mut self, index: usize) -> Option<SavedPosition> {
        if index >= self.bookmarks.len() {
            return None;
        }
        let removed = self.bookmarks.remove(index);
        self.persist();
        Some(removed)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            log::error!("Failed to save reading state: {e}");
        }
    }
}
