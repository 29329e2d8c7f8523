//! Cross-session note store.
//!
//! An append-oriented JSONL file used for informational notes between
//! sessions: one JSON entry per line, auto-incrementing integer ids. The
//! recovery core only depends on two operations - appending an entry and
//! marking an entry's status - so the store stays deliberately small.
//! Notes are audit visibility, not recovery state.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SalvorError};

/// Lifecycle status of one note entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Entry still needs attention.
    #[default]
    Active,
    /// Entry was handled.
    Done,
    /// Entry was dismissed without action.
    Discard,
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoteStatus::Active => "active",
            NoteStatus::Done => "done",
            NoteStatus::Discard => "discard",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for NoteStatus {
    type Err = SalvorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(NoteStatus::Active),
            "done" => Ok(NoteStatus::Done),
            "discard" => Ok(NoteStatus::Discard),
            other => Err(SalvorError::invalid_argument(
                "status",
                format!("unknown note status '{}'", other),
            )),
        }
    }
}

/// One note entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEntry {
    /// Auto-incrementing id, unique within one store file.
    pub id: u64,
    /// Who wrote the entry (a session name, "salvor", a task id).
    pub source: String,
    /// Entry status.
    pub status: NoteStatus,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// One-line summary for listings.
    pub short_hint: String,
    /// Full note text.
    pub content: String,
}

/// File-backed note store, one JSON entry per line.
#[derive(Debug, Clone)]
pub struct NoteStore {
    path: PathBuf,
}

impl NoteStore {
    /// Open (creating parent directories for) a note store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// The conventional note store location inside a workspace.
    #[must_use]
    pub fn default_path(workspace: &Path) -> PathBuf {
        workspace.join(".salvor").join("notes.jsonl")
    }

    /// Append a new entry and return it.
    pub fn append(
        &self,
        source: impl Into<String>,
        short_hint: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<NoteEntry> {
        let next_id = self
            .entries()?
            .last()
            .map(|e| e.id + 1)
            .unwrap_or(0);

        let entry = NoteEntry {
            id: next_id,
            source: source.into(),
            status: NoteStatus::Active,
            timestamp: Utc::now(),
            short_hint: short_hint.into(),
            content: content.into(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json = serde_json::to_string(&entry)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(entry)
    }

    /// Mark an entry's status.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entry has the given id.
    pub fn set_status(&self, id: u64, status: NoteStatus) -> Result<()> {
        let mut entries = self.entries()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SalvorError::NotFound {
                kind: "note entry".to_string(),
                name: id.to_string(),
            })?;
        entry.status = status;

        // Rewrite the whole file atomically; entries stay in append order.
        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut tmp = File::create(&tmp_path)?;
        for entry in &entries {
            writeln!(tmp, "{}", serde_json::to_string(entry)?)?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// All entries in append order. Unparseable lines are skipped with a
    /// warning so one bad line does not hide the rest.
    pub fn entries(&self) -> Result<Vec<NoteEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    lineno,
                    error = %e,
                    "skipping unparseable note line"
                ),
            }
        }
        Ok(entries)
    }
}

// ============================================================================
// Tests
// ============================================================================
