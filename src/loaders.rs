//! Text sources: turn files on disk into ordered `(id, text)` lists.
//!
//! Supported formats are plain text (one utterance per line, optionally
//! `id<TAB>text`), JSON arrays, and JSONL. Blank lines are dropped; the
//! orchestrator independently guards against blank text anyway.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::TextItem;

#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    NotFound(std::path::PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected a JSON array of objects in {0}")]
    NotAnArray(std::path::PathBuf),
}

/// Load text items from `path`, dispatching on the file extension.
///
/// `.json` and `.jsonl` get structured parsing; everything else is read
/// as plain text.
pub fn load(path: &Path) -> Result<Vec<TextItem>, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => load_json(path),
        Some("jsonl") => load_jsonl(path),
        _ => load_text_file(path),
    }
}

/// One item per line. A line containing a tab is split into `id` and
/// `text`; otherwise the 1-based line number becomes the id. Blank lines
/// produce nothing.
pub fn load_text_file(path: &Path) -> Result<Vec<TextItem>, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path)?;
    let mut items = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let text = line.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            continue;
        }

        match text.split_once('\t') {
            Some((id, content)) => {
                items.push(TextItem::new(id.trim(), content.trim()));
            }
            None => {
                items.push(TextItem::new((line_num + 1).to_string(), text.trim()));
            }
        }
    }

    log::info!("Loaded {} text items from {}", items.len(), path.display());
    Ok(items)
}

/// A JSON array of objects. `id` falls back to the 1-based position; the
/// text is taken from the first of `text`, `content`, or `transcript`.
/// Objects without any text field are skipped.
pub fn load_json(path: &Path) -> Result<Vec<TextItem>, LoaderError> {
    let content = std::fs::read_to_string(path)?;
    let data: serde_json::Value = serde_json::from_str(&content)?;

    let array = data
        .as_array()
        .ok_or_else(|| LoaderError::NotAnArray(path.to_path_buf()))?;

    let mut items = Vec::new();
    for (index, value) in array.iter().enumerate() {
        if let Some(item) = item_from_value(value, index + 1) {
            items.push(item);
        }
    }

    log::info!("Loaded {} text items from {}", items.len(), path.display());
    Ok(items)
}

/// One JSON object per line. Malformed lines are logged and skipped
/// rather than failing the whole file.
pub fn load_jsonl(path: &Path) -> Result<Vec<TextItem>, LoaderError> {
    let file = std::fs::File::open(path)?;
    let mut items = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => {
                if let Some(item) = item_from_value(&value, line_num + 1) {
                    items.push(item);
                }
            }
            Err(e) => log::warn!("Skipping malformed JSON line {}: {e}", line_num + 1),
        }
    }

    log::info!("Loaded {} text items from {}", items.len(), path.display());
    Ok(items)
}

fn item_from_value(value: &serde_json::Value, fallback_id: usize) -> Option<TextItem> {
    let object = value.as_object()?;

    let text = ["text", "content", "transcript"]
        .iter()
        .find_map(|key| object.get(*key).and_then(|v| v.as_str()))?;
    if text.trim().is_empty() {
        return None;
    }

    let id = match object.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => fallback_id.to_string(),
    };

    Some(TextItem::new(id, text.trim()))
}
