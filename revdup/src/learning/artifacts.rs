//! Training artifacts
//!
//! - labeled pairs: JSON `{"distinct": [[a, b], ...], "match": [[a, b], ...]}`
//!   with sorted keys and a trailing newline
//! - learned settings: `MAGIC | sha256(payload) | payload`, written through a
//!   temp file and renamed into place; a truncated or altered blob is rejected
//! - advisory lock file held for the whole training/application run

use super::TrainedModel;
use crate::error::{DedupeError, Result};
use crate::similarity::ComparisonRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const ARTIFACT_DIR: &str = ".revdup";
const TRAINING_FILE: &str = "dedupe_training.json";
const SETTINGS_FILE: &str = "dedupe_settings.bin";
const MERGE_LOG_FILE: &str = "merge_log.jsonl";
const SAME_SOURCE_REPORT: &str = "same_source_merges.txt";
const LOCK_FILE: &str = "dedupe.lock";

/// Leading bytes of a settings blob
const SETTINGS_MAGIC: &[u8; 8] = b"RVDSET01";
const DIGEST_LEN: usize = 32;

/// Locations of the per-project dedupe artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    /// Artifacts under `<root>/.revdup`
    pub fn in_root(root: &Path) -> Self {
        Self {
            dir: root.join(ARTIFACT_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn training_file(&self) -> PathBuf {
        self.dir.join(TRAINING_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn merge_log(&self) -> PathBuf {
        self.dir.join(MERGE_LOG_FILE)
    }

    pub fn same_source_report(&self) -> PathBuf {
        self.dir.join(SAME_SOURCE_REPORT)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Labeled training pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(default)]
    pub distinct: Vec<(ComparisonRecord, ComparisonRecord)>,
    #[serde(default, rename = "match")]
    pub matches: Vec<(ComparisonRecord, ComparisonRecord)>,
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| DedupeError::Io(e.error))?;
    Ok(())
}

/// Write labeled pairs (sorted keys, newline-terminated)
pub fn write_training_file(path: &Path, data: &TrainingData) -> Result<()> {
    let value = sort_keys(serde_json::to_value(data)?);
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');
    write_atomically(path, text.as_bytes())?;
    debug!(
        path = %path.display(),
        matches = data.matches.len(),
        distinct = data.distinct.len(),
        "Training file written"
    );
    Ok(())
}

/// Read labeled pairs; `None` when no training file exists yet
pub fn read_training_file(path: &Path) -> Result<Option<TrainingData>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text).map_err(|e| {
            DedupeError::CorruptArtifact(format!("{}: {}", path.display(), e))
        })?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persist learned classifier settings
pub fn write_settings(path: &Path, model: &TrainedModel) -> Result<()> {
    let payload = serde_json::to_vec(model)?;
    let digest = Sha256::digest(&payload);

    let mut blob = Vec::with_capacity(SETTINGS_MAGIC.len() + DIGEST_LEN + payload.len());
    blob.extend_from_slice(SETTINGS_MAGIC);
    blob.extend_from_slice(&digest);
    blob.extend_from_slice(&payload);

    write_atomically(path, &blob)?;
    info!(path = %path.display(), bytes = blob.len(), "Classifier settings saved");
    Ok(())
}

/// Load learned classifier settings; `None` when absent
pub fn read_settings(path: &Path) -> Result<Option<TrainedModel>> {
    let blob = match fs::read(path) {
        Ok(blob) => blob,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let header_len = SETTINGS_MAGIC.len() + DIGEST_LEN;
    if blob.len() < header_len || &blob[..SETTINGS_MAGIC.len()] != SETTINGS_MAGIC {
        return Err(DedupeError::CorruptArtifact(format!(
            "{}: not a settings blob",
            path.display()
        )));
    }
    let expected = &blob[SETTINGS_MAGIC.len()..header_len];
    let payload = &blob[header_len..];
    if Sha256::digest(payload).as_slice() != expected {
        warn!(path = %path.display(), "Settings blob checksum mismatch");
        return Err(DedupeError::CorruptArtifact(format!(
            "{}: checksum mismatch (partial write?)",
            path.display()
        )));
    }
    let model = serde_json::from_slice(payload)
        .map_err(|e| DedupeError::CorruptArtifact(format!("{}: {}", path.display(), e)))?;
    Ok(Some(model))
}

/// Advisory lock over the training file and settings blob
///
/// Released when dropped.
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
}

impl ArtifactLock {
    pub fn acquire(paths: &ArtifactPaths) -> Result<Self> {
        paths.ensure_dir()?;
        let path = paths.lock_file();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!(path = %path.display(), "Artifact lock acquired");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(DedupeError::Locked(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release artifact lock");
        }
    }
}
