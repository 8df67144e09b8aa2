#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use thiserror::Error;

use crate::assignment::model::{Assignment, AssignmentStatus, FieldPatch, now_rfc3339};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("assignment '{0}' not found")]
    NotFound(String),

    #[error("assignment '{id}' is {actual}, expected {expected}")]
    Conflict {
        id: String,
        expected: AssignmentStatus,
        actual: AssignmentStatus,
    },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// File-backed assignment record store: one JSON document per record.
///
/// All writes go through a temp file and an atomic rename, so readers never
/// observe a half-written record. `update_status_and_fields` additionally
/// holds the store lock across its read-compare-write, so concurrent
/// transitions on the same record serialize and the loser sees a `Conflict`.
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl AssignmentStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create assignment dir {}", self.dir.display()))
    }

    /// Persist a record as-is. Used at creation time; lifecycle mutations go
    /// through `update_status_and_fields` instead.
    pub fn save(&self, assignment: &Assignment) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let path = self.record_path(&assignment.id)?;
        write_atomic(&path, assignment)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Assignment>, StoreError> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record: Assignment = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn list(&self) -> anyhow::Result<Vec<Assignment>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records: Vec<Assignment> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = std::fs::read(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_slice(&data) else {
                continue;
            };
            records.push(record);
        }
        records.sort_by(|a: &Assignment, b: &Assignment| {
            b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Conditional update: commits `next_status` plus the patch's fields in
    /// one write, but only while the stored status still equals `expected`.
    /// Returns the updated record.
    pub fn update_status_and_fields(
        &self,
        id: &str,
        expected: AssignmentStatus,
        next_status: AssignmentStatus,
        fields: &FieldPatch,
    ) -> Result<Assignment, StoreError> {
        let guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("assignment store lock poisoned"))?;

        let mut record = self
            .find_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

        if record.status != expected {
            return Err(StoreError::Conflict {
                id: id.to_owned(),
                expected,
                actual: record.status,
            });
        }

        fields.apply(&mut record);
        record.status = next_status;
        record.updated_at = Some(now_rfc3339());

        let path = self.record_path(id)?;
        write_atomic(&path, &record)?;
        drop(guard);

        Ok(record)
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        let path = self.record_path(id)?;
        let _ = std::fs::remove_file(path);
        Ok(())
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, anyhow::Error> {
        validate_record_id(id)?;
        Ok(self.dir.join(format!("assignment-{id}.json")))
    }
}

fn write_atomic(path: &Path, record: &Assignment) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(record)?;
    std::fs::write(&tmp, &data).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

fn validate_record_id(id: &str) -> anyhow::Result<()> {
    if id.trim().is_empty() {
        anyhow::bail!("assignment ID is required");
    }
    if id.contains('/') || id.contains('\\') {
        anyhow::bail!("invalid assignment ID '{id}': must not contain path separators");
    }
    if id.contains("..") {
        anyhow::bail!("invalid assignment ID '{id}': must not contain '..'");
    }
    Ok(())
}
