//! Flat on-disk format for task records.
//!
//! A record file is three sections:
//!
//! ```text
//! # salvor task record v1
//! id: t-8f2c
//! created_at: 2026-01-05T10:00:00+00:00
//! updated_at: 2026-01-05T10:02:11+00:00
//! model: sonnet
//! depth: 0
//! status: active
//! --- prompt begin ---
//! Refactor the retry logic in src/net.rs ...
//! --- prompt end ---
//! --- notes ---
//! 2026-01-05T10:02:11+00:00 | branch allocated: task/t-8f2c
//! ```
//!
//! Fields are flat `key: value` lines so that a truncated or partially
//! written file is locally detectable: the integrity check scans for the
//! header, the required fields, and intact prompt delimiters without having
//! to parse a nested structure. The prompt is stored verbatim between the
//! delimiter lines and round-trips byte-for-byte.

use chrono::{DateTime, Utc};

use super::record::{NoteLine, TaskRecord, TaskStatus};
use crate::error::{Result, SalvorError};

/// Magic first line of every record file.
pub const HEADER: &str = "# salvor task record v1";

/// Line that opens the verbatim prompt block.
pub const PROMPT_BEGIN: &str = "--- prompt begin ---";

/// Line that closes the verbatim prompt block.
pub const PROMPT_END: &str = "--- prompt end ---";

/// Line that opens the append-only notes section.
pub const NOTES_HEADER: &str = "--- notes ---";

// ============================================================================
// Encoding
// ============================================================================

/// Check that a prompt can be stored verbatim in the flat format.
///
/// A prompt containing a delimiter line verbatim could not be parsed back,
/// so it is rejected up front instead of producing an unreadable record.
pub fn check_prompt_encodable(prompt: &str) -> Result<()> {
    for line in prompt.lines() {
        if line == PROMPT_END || line == PROMPT_BEGIN {
            return Err(SalvorError::invalid_argument(
                "prompt",
                format!("prompt must not contain the delimiter line '{}'", line),
            ));
        }
    }
    Ok(())
}

/// Encode a record into its on-disk text form.
#[must_use]
pub fn encode(record: &TaskRecord) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');

    push_field(&mut out, "id", &record.id);
    push_field(&mut out, "created_at", &record.created_at.to_rfc3339());
    push_field(&mut out, "updated_at", &record.updated_at.to_rfc3339());
    push_field(&mut out, "model", &record.model);
    push_field(&mut out, "depth", &record.depth.to_string());
    if let Some(parent) = &record.parent_id {
        push_field(&mut out, "parent_id", parent);
    }
    if let Some(branch) = &record.branch_name {
        push_field(&mut out, "branch_name", branch);
    }
    if let Some(review) = &record.review_ref {
        push_field(&mut out, "review_ref", review);
    }
    if let Some(commit) = &record.last_good_commit {
        push_field(&mut out, "last_good_commit", commit);
    }
    push_field(&mut out, "status", &record.status.to_string());

    out.push_str(PROMPT_BEGIN);
    out.push('\n');
    out.push_str(&record.prompt);
    out.push('\n');
    out.push_str(PROMPT_END);
    out.push('\n');

    out.push_str(NOTES_HEADER);
    out.push('\n');
    for note in &record.notes {
        out.push_str(&note.timestamp.to_rfc3339());
        out.push_str(" | ");
        out.push_str(&escape_note(&note.text));
        out.push('\n');
    }

    out
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// Escape note text onto a single line.
fn escape_note(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Reverse of [`escape_note`].
fn unescape_note(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a record from its on-disk text form.
///
/// # Errors
///
/// Returns `ValidationFailed` describing the first structural problem found.
pub fn parse(text: &str) -> Result<TaskRecord> {
    if let Some(problem) = integrity_problems(text).into_iter().next() {
        let id = raw_field(text, "id").unwrap_or_else(|| "?".to_string());
        return Err(SalvorError::validation(id, problem));
    }

    let id = raw_field(text, "id").expect("integrity check verified id");
    let fail = |reason: String| SalvorError::validation(id.clone(), reason);

    let created_at = parse_timestamp(text, "created_at").map_err(&fail)?;
    let updated_at = parse_timestamp(text, "updated_at").map_err(&fail)?;
    let model = raw_field(text, "model").expect("integrity check verified model");
    let depth: u32 = raw_field(text, "depth")
        .ok_or_else(|| fail("missing field 'depth'".to_string()))?
        .parse()
        .map_err(|e| fail(format!("malformed depth: {}", e)))?;
    let status: TaskStatus = raw_field(text, "status")
        .expect("integrity check verified status")
        .parse()
        .map_err(|e: SalvorError| fail(e.to_string()))?;

    let prompt = prompt_block(text).ok_or_else(|| fail("prompt block not found".to_string()))?;
    let notes = parse_notes(text).map_err(&fail)?;

    Ok(TaskRecord {
        id,
        created_at,
        updated_at,
        model,
        depth,
        parent_id: raw_field(text, "parent_id"),
        branch_name: raw_field(text, "branch_name"),
        review_ref: raw_field(text, "review_ref"),
        last_good_commit: raw_field(text, "last_good_commit"),
        status,
        prompt,
        notes,
    })
}

/// Structural problems in a raw record file, cheapest checks first.
///
/// Empty means the record passes the integrity check used by `validate`:
/// required fields present and well-formed, prompt delimiters intact.
#[must_use]
pub fn integrity_problems(text: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if text.lines().next() != Some(HEADER) {
        problems.push("missing or wrong header line".to_string());
    }

    for required in ["id", "model", "status"] {
        match raw_field(text, required) {
            None => problems.push(format!("missing field '{}'", required)),
            Some(v) if v.trim().is_empty() => {
                problems.push(format!("empty field '{}'", required));
            }
            Some(_) => {}
        }
    }
    if let Some(status) = raw_field(text, "status") {
        if status.parse::<TaskStatus>().is_err() {
            problems.push(format!("malformed status '{}'", status));
        }
    }

    let begin = find_marker(text, PROMPT_BEGIN);
    let end = find_marker(text, PROMPT_END);
    match (begin, end) {
        (Some(b), Some(e)) if b < e => {}
        (Some(_), Some(_)) => problems.push("prompt delimiters out of order".to_string()),
        (None, _) => problems.push("prompt begin delimiter missing".to_string()),
        (_, None) => problems.push("prompt end delimiter missing".to_string()),
    }
    if find_marker(text, NOTES_HEADER).is_none() {
        problems.push("notes section header missing".to_string());
    }

    problems
}

/// Byte offset of a marker occupying a whole line, or `None`.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    if text.starts_with(&format!("{}\n", marker)) {
        return Some(0);
    }
    text.find(&format!("\n{}\n", marker)).map(|i| i + 1)
}

/// Raw value of a `key: value` header line, searched before the prompt block.
fn raw_field(text: &str, key: &str) -> Option<String> {
    let header_end = find_marker(text, PROMPT_BEGIN).unwrap_or(text.len());
    let prefix = format!("{}: ", key);
    text[..header_end]
        .lines()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|v| v.to_string())
}

fn parse_timestamp(text: &str, key: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw_field(text, key).ok_or_else(|| format!("missing field '{}'", key))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("malformed {}: {}", key, e))
}

/// Extract the verbatim prompt bytes between the delimiter lines.
fn prompt_block(text: &str) -> Option<String> {
    let begin = find_marker(text, PROMPT_BEGIN)?;
    let body_start = begin + PROMPT_BEGIN.len() + 1;
    let end = find_marker(text, PROMPT_END)?;
    if end <= body_start {
        return None;
    }
    // The encoder writes prompt + '\n' before the end marker; strip that one
    // newline so the original bytes come back exactly.
    Some(text[body_start..end - 1].to_string())
}

fn parse_notes(text: &str) -> std::result::Result<Vec<NoteLine>, String> {
    let header = match find_marker(text, NOTES_HEADER) {
        Some(i) => i,
        None => return Ok(Vec::new()),
    };
    let body = &text[header + NOTES_HEADER.len() + 1..];

    let mut notes = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (raw_ts, raw_text) = line
            .split_once(" | ")
            .ok_or_else(|| format!("malformed note line: '{}'", line))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_ts)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("malformed note timestamp: {}", e))?;
        notes.push(NoteLine {
            timestamp,
            text: unescape_note(raw_text),
        });
    }
    Ok(notes)
}

// ============================================================================
// Tests
// ============================================================================
