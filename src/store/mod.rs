//! Durable, keyed storage for task records.
//!
//! One flat-format file per task (see [`format`]), written atomically via a
//! temp file + rename under an advisory lock, so that readers never observe
//! a partially updated record and a crash mid-write leaves either the old
//! record or the new one, never a hybrid.

pub mod format;
pub mod record;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Result, SalvorError};
pub use format::{NOTES_HEADER, PROMPT_BEGIN, PROMPT_END};
pub use record::{NoteLine, TaskField, TaskRecord, TaskStatus, TaskSummary};

/// File extension for record files.
const RECORD_EXT: &str = "task";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Store-level lock file name.
const LOCK_FILE: &str = "store.lock";

/// File-backed task record store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    /// Directory holding one `<id>.task` file per record.
    dir: PathBuf,
}

impl TaskStore {
    /// Open (and create if missing) a store rooted at `dir`.
    ///
    /// A freshly created directory is made self-ignoring (a `.gitignore`
    /// containing `*`) so engine state inside a workspace repository never
    /// shows up as working-tree changes to the inspector or the stash.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let created = !dir.exists();
        fs::create_dir_all(&dir)?;
        if created {
            fs::write(dir.join(".gitignore"), "*\n")?;
        }
        Ok(Self { dir })
    }

    /// The conventional store location inside a workspace.
    #[must_use]
    pub fn default_dir(workspace: &Path) -> PathBuf {
        workspace.join(".salvor").join("tasks")
    }

    /// Create the workspace state directory (`.salvor/`), self-ignoring.
    pub fn ensure_state_dir(workspace: &Path) -> Result<PathBuf> {
        let dir = workspace.join(".salvor");
        let created = !dir.exists();
        fs::create_dir_all(&dir)?;
        if created {
            fs::write(dir.join(".gitignore"), "*\n")?;
        }
        Ok(dir)
    }

    /// Path of the record file for `id`.
    #[must_use]
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXT))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    // ------------------------------------------------------------------------
    // Contract operations
    // ------------------------------------------------------------------------

    /// Create a new record.
    ///
    /// The record is durably visible to subsequent reads before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if `id` is already present.
    /// - `InvalidArgument` if `prompt` or `model` is empty, the id is not
    ///   usable as a file name, or the prompt contains a delimiter line.
    pub fn create(
        &self,
        id: &str,
        prompt: &str,
        model: &str,
        depth: u32,
        parent_id: Option<String>,
    ) -> Result<TaskRecord> {
        check_id_shape(id)?;
        format::check_prompt_encodable(prompt)?;

        let _lock = self.lock_exclusive()?;
        if self.record_path(id).exists() {
            return Err(SalvorError::AlreadyExists { id: id.to_string() });
        }

        let record = TaskRecord::new(id, prompt, model, depth, parent_id, Utc::now())?;
        self.write_locked(&record)?;
        debug!(id, model, depth, "task record created");
        Ok(record)
    }

    /// Load the typed record for `id`.
    pub fn read(&self, id: &str) -> Result<TaskRecord> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(SalvorError::record_not_found(id));
        }
        let _lock = self.lock_shared()?;
        let text = fs::read_to_string(&path)?;
        format::parse(&text)
    }

    /// Persist a typed record, replacing any previous version atomically.
    pub fn write(&self, record: &TaskRecord) -> Result<()> {
        let _lock = self.lock_exclusive()?;
        self.write_locked(record)
    }

    /// Read a single field by raw name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record does not exist, the field name is unknown,
    /// or an optional field is currently unset.
    pub fn read_field(&self, id: &str, field: &str) -> Result<String> {
        let field: TaskField = field.parse()?;
        let record = self.read(id)?;
        record
            .field_value(field)
            .ok_or_else(|| SalvorError::field_not_found(field.name()))
    }

    /// Write a single field by raw name, atomically with respect to other
    /// field writes on the same record. Always bumps `updated_at`.
    pub fn write_field(&self, id: &str, field: &str, value: &str) -> Result<()> {
        let field: TaskField = field.parse()?;
        let path = self.record_path(id);
        if !path.exists() {
            return Err(SalvorError::record_not_found(id));
        }

        // Read-modify-write under one exclusive lock so concurrent field
        // writes serialize on the whole record.
        let _lock = self.lock_exclusive()?;
        let text = fs::read_to_string(&path)?;
        let mut record = format::parse(&text)?;
        record.set_field(field, value, Utc::now())?;
        self.write_locked(&record)?;
        debug!(id, field = field.name(), "field written");
        Ok(())
    }

    /// Return the exact immutable prompt text.
    pub fn read_prompt(&self, id: &str) -> Result<String> {
        Ok(self.read(id)?.prompt)
    }

    /// Append a timestamped note entry.
    pub fn append_note(&self, id: &str, text: &str) -> Result<()> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(SalvorError::record_not_found(id));
        }
        let _lock = self.lock_exclusive()?;
        let raw = fs::read_to_string(&path)?;
        let mut record = format::parse(&raw)?;
        record.push_note(text, Utc::now());
        self.write_locked(&record)
    }

    /// Integrity check: required fields present and well-formed, prompt
    /// delimiter markers intact. A missing or unreadable record is invalid.
    #[must_use]
    pub fn validate(&self, id: &str) -> bool {
        let text = match fs::read_to_string(self.record_path(id)) {
            Ok(t) => t,
            Err(_) => return false,
        };
        let problems = format::integrity_problems(&text);
        if !problems.is_empty() {
            warn!(id, ?problems, "record failed integrity check");
        }
        problems.is_empty()
    }

    /// Delete the record. Idempotent: succeeds even if absent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.record_path(id);
        if path.exists() {
            let _lock = self.lock_exclusive()?;
            fs::remove_file(&path)?;
            debug!(id, "task record deleted");
        }
        Ok(())
    }

    /// List summaries of all records, in stable order by creation time
    /// (ties broken by id).
    ///
    /// Files that fail to parse are skipped with a warning rather than
    /// aborting the listing.
    pub fn list(&self) -> Result<Vec<TaskSummary>> {
        let _lock = self.lock_shared()?;
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match format::parse(&text) {
                Ok(record) => summaries.push(record.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable record"),
            }
        }
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Write a record via temp file + fsync + rename. Caller holds the lock.
    fn write_locked(&self, record: &TaskRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let tmp_path = self.dir.join(format!(
            "{}.{}{}",
            record.id, RECORD_EXT, TMP_SUFFIX
        ));

        let text = format::encode(record);
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(text.as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<File> {
        let lock = File::create(self.lock_path())?;
        FileExt::lock_exclusive(&lock)?;
        Ok(lock)
    }

    fn lock_shared(&self) -> Result<File> {
        let lock = File::create(self.lock_path())?;
        FileExt::lock_shared(&lock)?;
        Ok(lock)
    }
}

/// Reject ids that would escape the store directory or hide the file.
fn check_id_shape(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(SalvorError::invalid_argument("id", "must not be empty"));
    }
    if id.starts_with('.') || id.contains('/') || id.contains('\\') {
        return Err(SalvorError::invalid_argument(
            "id",
            "must not contain path separators or start with '.'",
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
