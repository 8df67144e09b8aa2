#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignment::model::now_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Driver {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: String,
}

impl Driver {
    #[must_use]
    pub fn new(id: String, name: String, phone: Option<String>) -> Self {
        Self {
            id,
            name,
            phone,
            created_at: now_rfc3339(),
        }
    }

    #[must_use]
    pub fn new_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        id.chars().take(6).collect()
    }
}

/// File-backed driver directory. Only existence matters to the lifecycle
/// core; the record itself is admin bookkeeping.
#[derive(Debug, Clone)]
pub struct DriverDirectory {
    dir: PathBuf,
}

impl DriverDirectory {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create driver dir {}", self.dir.display()))
    }

    pub fn save(&self, driver: &Driver) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let path = self.driver_path(&driver.id)?;
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(driver)?;
        std::fs::write(&tmp, &data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Driver>> {
        let path = self.driver_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let driver: Driver = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(driver))
    }

    pub fn list(&self) -> anyhow::Result<Vec<Driver>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut drivers: Vec<Driver> = Vec::new();
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
            let Ok(driver) = serde_json::from_slice(&data) else {
                continue;
            };
            drivers.push(driver);
        }
        drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(drivers)
    }

    fn driver_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        if id.trim().is_empty() {
            anyhow::bail!("driver ID is required");
        }
        if id.contains('/') || id.contains('\\') || id.contains("..") {
            anyhow::bail!("invalid driver ID '{id}'");
        }
        Ok(self.dir.join(format!("driver-{id}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_find_list_round_trip() {
        let td = tempfile::tempdir().expect("tempdir");
        let dirs = DriverDirectory::new(td.path().join("drivers"));

        let d = Driver::new("d1".into(), "Rajesh".into(), Some("9618544459".into()));
        dirs.save(&d).unwrap();

        assert_eq!(dirs.find_by_id("d1").unwrap().unwrap(), d);
        assert!(dirs.find_by_id("d2").unwrap().is_none());
        assert_eq!(dirs.list().unwrap().len(), 1);
    }

    #[test]
    fn driver_ids_cannot_escape_the_dir() {
        let td = tempfile::tempdir().expect("tempdir");
        let dirs = DriverDirectory::new(td.path().join("drivers"));
        assert!(dirs.find_by_id("../x").is_err());
    }
}
