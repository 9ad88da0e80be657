//! File persistence shared by the tracker, history and manifests
//!
//! Snapshots are rewritten atomically; journals are append-only JSON lines.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Write `data` to `path` via a temp file and rename, so readers never see a torn file
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write {:?}", temp_path))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize state")?;
    write_atomic(path, &json)
}

/// Read JSON from `path`; `Ok(None)` when the file does not exist yet
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to deserialize {:?}", path))?;
    Ok(Some(value))
}

/// Append one JSON document per line and sync
pub fn append_json_lines<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    let mut data = Vec::new();
    for value in values {
        serde_json::to_writer(&mut data, value).context("Failed to serialize journal entry")?;
        data.push(b'\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open journal {:?}", path))?;
    file.write_all(&data)
        .with_context(|| format!("Failed to append to {:?}", path))?;
    file.sync_data()
        .with_context(|| format!("Failed to sync {:?}", path))?;

    Ok(())
}

/// Read a JSON-lines journal; a missing file is empty and a torn last line is skipped
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut values = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str(line) {
            Ok(value) => values.push(value),
            Err(e) if i + 1 == lines.len() => {
                warn!(path = %path.display(), error = %e, "Skipping torn journal line");
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to parse line {} of {:?}", i + 1, path));
            }
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_json(&path, &vec![1u32, 2, 3]).unwrap();
        let loaded: Option<Vec<u32>> = read_json(&path).unwrap();

        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Vec<u32>> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_journal_appends_across_calls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        append_json_lines(&path, &[1u32, 2]).unwrap();
        append_json_lines::<u32>(&path, &[]).unwrap();
        append_json_lines(&path, &[3u32]).unwrap();

        let loaded: Vec<u32> = read_json_lines(&path).unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn test_torn_last_journal_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "1\n2\n[3").unwrap();

        let loaded: Vec<u32> = read_json_lines(&path).unwrap();
        assert_eq!(loaded, vec![1, 2]);

        std::fs::write(&path, "1\n[2\n3\n").unwrap();
        assert!(read_json_lines::<u32>(&path).is_err());
    }
}
